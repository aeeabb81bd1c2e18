use clap::Args;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::local::LocalOptions;

pub const ENV_API_KEY: &str = "FRAMEZ_BACKEND_API_KEY";
pub const ENV_AUTH_DOMAIN: &str = "FRAMEZ_BACKEND_AUTH_DOMAIN";
pub const ENV_PROJECT_ID: &str = "FRAMEZ_BACKEND_PROJECT_ID";
pub const ENV_APP_ID: &str = "FRAMEZ_BACKEND_APP_ID";
pub const ENV_STORAGE_BUCKET: &str = "FRAMEZ_BACKEND_STORAGE_BUCKET";
pub const ENV_MESSAGING_SENDER_ID: &str = "FRAMEZ_BACKEND_MESSAGING_SENDER_ID";
pub const ENV_MEDIA_CLOUD_NAME: &str = "FRAMEZ_MEDIA_CLOUD_NAME";
pub const ENV_MEDIA_UPLOAD_PRESET: &str = "FRAMEZ_MEDIA_UPLOAD_PRESET";

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("could not determine home directory")]
    NoHomeDir,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub media: MediaConfig,
    pub feed: FeedConfig,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub app_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub database: Option<PathBuf>,
    pub indexes: Vec<String>,
    pub poll_interval_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MediaConfig {
    pub cloud_name: Option<String>,
    pub upload_preset: Option<String>,
    pub folder: String,
    pub api_base: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub max_posts: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_domain: None,
            project_id: None,
            app_id: None,
            storage_bucket: None,
            messaging_sender_id: None,
            database: None,
            indexes: vec!["posts.createdAt".to_string()],
            poll_interval_ms: 1000,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            upload_preset: None,
            folder: "framez-posts".to_string(),
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { max_posts: 50 }
    }
}

impl Config {
    /// Load from the config file and the process environment.
    pub fn load(args: &ConfigArgs) -> Result<Self, ConfigError> {
        Self::load_with_env(args, |key| std::env::var(key).ok())
    }

    /// File values first, then environment overrides, then validation.
    pub fn load_with_env<F>(args: &ConfigArgs, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = Self::data_dir(args)?;
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?
        } else {
            Config::default()
        };

        config.data_dir = data_dir;
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    pub fn data_dir(args: &ConfigArgs) -> Result<PathBuf, ConfigError> {
        match &args.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".framez"))
                .ok_or(ConfigError::NoHomeDir),
        }
    }

    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let backend = &mut self.backend;
        for (key, slot) in [
            (ENV_API_KEY, &mut backend.api_key),
            (ENV_AUTH_DOMAIN, &mut backend.auth_domain),
            (ENV_PROJECT_ID, &mut backend.project_id),
            (ENV_APP_ID, &mut backend.app_id),
            (ENV_STORAGE_BUCKET, &mut backend.storage_bucket),
            (ENV_MESSAGING_SENDER_ID, &mut backend.messaging_sender_id),
            (ENV_MEDIA_CLOUD_NAME, &mut self.media.cloud_name),
            (ENV_MEDIA_UPLOAD_PRESET, &mut self.media.upload_preset),
        ] {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
        }
    }

    /// Backend credentials are required to start at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backend;
        for (key, value) in [
            (ENV_API_KEY, &b.api_key),
            (ENV_AUTH_DOMAIN, &b.auth_domain),
            (ENV_PROJECT_ID, &b.project_id),
            (ENV_APP_ID, &b.app_id),
        ] {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                return Err(ConfigError::Missing(key));
            }
        }
        Ok(())
    }

    pub fn project_id(&self) -> &str {
        self.backend.project_id.as_deref().unwrap_or("framez")
    }

    /// Database file for the local backend.
    pub fn db_path(&self) -> PathBuf {
        self.backend
            .database
            .clone()
            .unwrap_or_else(|| self.data_dir.join(format!("{}.db", self.project_id())))
    }

    pub fn local_options(&self) -> LocalOptions {
        LocalOptions {
            indexes: self.backend.indexes.iter().cloned().collect::<HashSet<_>>(),
            poll_interval: match self.backend.poll_interval_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            ..LocalOptions::default()
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_dir
    }
}

impl MediaConfig {
    /// Cloud name and upload preset, both required for uploads.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let cloud_name = self
            .cloud_name
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(ENV_MEDIA_CLOUD_NAME))?;
        let upload_preset = self
            .upload_preset
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(ENV_MEDIA_UPLOAD_PRESET))?;
        Ok((cloud_name, upload_preset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_API_KEY, "key"),
            (ENV_AUTH_DOMAIN, "framez.example.com"),
            (ENV_PROJECT_ID, "framez-dev"),
            (ENV_APP_ID, "1:app"),
        ]
    }

    fn args(dir: &Path) -> ConfigArgs {
        ConfigArgs {
            config: None,
            data_dir: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.feed.max_posts, 50);
        assert_eq!(config.media.folder, "framez-posts");
        assert_eq!(config.backend.indexes, vec!["posts.createdAt"]);
        assert_eq!(config.backend.poll_interval_ms, 1000);
        assert!(config.backend.api_key.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let a = args(Path::new("/tmp/test-framez"));
        assert_eq!(
            Config::data_dir(&a).unwrap(),
            PathBuf::from("/tmp/test-framez")
        );
    }

    #[test]
    fn data_dir_defaults_to_home_dot_framez() {
        let dir = Config::data_dir(&ConfigArgs::default()).unwrap();
        assert!(dir.ends_with(".framez"));
    }

    #[test]
    fn load_from_env_only() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with_env(&args(tmp.path()), env(&full_env())).unwrap();
        assert_eq!(config.project_id(), "framez-dev");
        assert_eq!(config.db_path(), tmp.path().join("framez-dev.db"));
        assert!(config.media.credentials().is_err());
    }

    #[test]
    fn missing_required_variable_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut vars = full_env();
        vars.retain(|(k, _)| *k != ENV_APP_ID);

        let err = Config::load_with_env(&args(tmp.path()), env(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_APP_ID)));
        assert!(err.to_string().contains("FRAMEZ_BACKEND_APP_ID"));
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut vars = full_env();
        vars.push((ENV_API_KEY, "  "));
        vars.remove(0);

        let err = Config::load_with_env(&args(tmp.path()), env(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_API_KEY)));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            r#"
[backend]
api_key = "file-key"
auth_domain = "file.example.com"
project_id = "from-file"
app_id = "file-app"
indexes = []
poll_interval_ms = 0

[media]
cloud_name = "demo"
upload_preset = "unsigned"

[feed]
max_posts = 20
"#,
        )
        .unwrap();

        let config = Config::load_with_env(&args(tmp.path()), env(&[])).unwrap();
        assert_eq!(config.project_id(), "from-file");
        assert_eq!(config.feed.max_posts, 20);
        assert_eq!(config.media.credentials().unwrap(), ("demo", "unsigned"));

        let options = config.local_options();
        assert!(options.indexes.is_empty());
        assert!(options.poll_interval.is_none());
    }

    #[test]
    fn env_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[backend]
api_key = "file-key"
auth_domain = "file.example.com"
project_id = "from-file"
app_id = "file-app"
database = "/var/lib/framez/explicit.db"
"#,
        )
        .unwrap();

        let a = ConfigArgs {
            config: Some(path),
            data_dir: Some(tmp.path().to_path_buf()),
        };
        let config = Config::load_with_env(
            &a,
            env(&[(ENV_PROJECT_ID, "from-env"), (ENV_MEDIA_CLOUD_NAME, "cloud")]),
        )
        .unwrap();
        assert_eq!(config.project_id(), "from-env");
        assert_eq!(config.media.cloud_name.as_deref(), Some("cloud"));
        assert_eq!(
            config.db_path(),
            PathBuf::from("/var/lib/framez/explicit.db")
        );
    }

    #[test]
    fn malformed_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "[backend\napi_key =").unwrap();
        let err = Config::load_with_env(&args(tmp.path()), env(&full_env())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
