use std::sync::Arc;

use crate::auth::SessionStore;
use crate::backend::local::LocalBackend;
use crate::backend::{AuthBackend, DocumentStore};
use crate::config::Config;
use crate::error::{FramezError, FramezResult};
use crate::media::MediaClient;
use crate::models::AuthUser;
use crate::services::{PostService, UserService};

/// Everything one client needs, wired once at startup.
pub struct App {
    pub config: Config,
    pub backend: LocalBackend,
    pub session: SessionStore,
    pub users: UserService,
    pub posts: PostService,
}

impl App {
    /// Open the local backend named by `config` and restore the session.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config.data_path())?;
        let db_path = config.db_path();
        tracing::info!("Database: {}", db_path.display());

        let backend = LocalBackend::open(&db_path, config.local_options())?;
        Ok(Self::with_backend(config, backend).await)
    }

    pub async fn with_backend(config: Config, backend: LocalBackend) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(backend.clone());
        let auth: Arc<dyn AuthBackend> = Arc::new(backend.clone());

        let users = UserService::new(store.clone());
        let posts = PostService::new(store, users.clone());
        let session = SessionStore::new(auth, users.clone());
        session.initialize().await;

        Self {
            config,
            backend,
            session,
            users,
            posts,
        }
    }

    /// Media client for uploads; fails when upload settings are missing.
    pub fn media(&self) -> FramezResult<MediaClient> {
        Ok(MediaClient::new(&self.config.media)?)
    }

    /// The signed-in user, or an auth error telling the caller to sign in.
    pub async fn require_user(&self) -> FramezResult<AuthUser> {
        self.session.current_user().await.ok_or_else(|| {
            FramezError::Operation {
                message: "Not signed in. Run `framez signin` first.".to_string(),
                source: None,
            }
        })
    }
}
