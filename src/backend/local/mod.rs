//! SQLite-backed implementation of the backend traits.
//!
//! Documents are JSON rows keyed by `(collection, id)`. Live queries are
//! tokio tasks woken by an in-process change broadcast; an optional poll
//! interval also picks up writes made by other processes sharing the file.

mod auth;
mod store;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, OptionalExtension};
use tokio::sync::{broadcast, watch};

use crate::backend::BackendResult;
use crate::db::{self, DbPool};
use crate::models::AuthUser;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct LocalOptions {
    /// Ordered queries the store accepts. An unfiltered query ordered by
    /// `field` needs `"collection.field"`; a filtered one needs
    /// `"collection.filter_field,order_field"`. Anything else fails with
    /// `failed-precondition`.
    pub indexes: HashSet<String>,
    /// Re-run live queries on this interval as well as on local writes.
    pub poll_interval: Option<Duration>,
    pub bcrypt_cost: u32,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            indexes: HashSet::from(["posts.createdAt".to_string()]),
            poll_interval: Some(Duration::from_millis(1000)),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Clone)]
pub struct LocalBackend {
    inner: Arc<Inner>,
}

struct Inner {
    db: DbPool,
    options: LocalOptions,
    changes: broadcast::Sender<String>,
    auth_state: watch::Sender<Option<AuthUser>>,
}

impl LocalBackend {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn open(path: &Path, options: LocalOptions) -> anyhow::Result<Self> {
        let pool = db::create_pool(path)?;
        db::run_migrations(&pool)?;
        tracing::info!("Local backend opened at {}", path.display());
        Ok(Self::from_pool(pool, options)?)
    }

    /// Wrap an already-migrated pool. The signed-in user is restored from
    /// the persisted session row.
    pub fn from_pool(db: DbPool, options: LocalOptions) -> BackendResult<Self> {
        let persisted = load_session_user(&db)?;
        if let Some(user) = &persisted {
            tracing::info!("Restored session for {}", user.uid);
        }

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (auth_state, _) = watch::channel(persisted);

        Ok(Self {
            inner: Arc::new(Inner {
                db,
                options,
                changes,
                auth_state,
            }),
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.inner.db
    }

    fn notify(&self, collection: &str) {
        // No receivers just means no live queries.
        let _ = self.inner.changes.send(collection.to_string());
    }
}

fn load_session_user(db: &DbPool) -> BackendResult<Option<AuthUser>> {
    let conn = db.get()?;
    let user = conn
        .query_row(
            "SELECT u.uid, u.email, u.display_name, u.photo_url
             FROM auth_session s
             JOIN auth_users u ON u.uid = s.uid
             WHERE s.slot = 1",
            params![],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuthUser> {
    Ok(AuthUser {
        uid: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        photo_url: row.get(3)?,
    })
}

/// Random alphanumeric identifier.
fn generate_id(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A backend on a fresh temp file with cheap hashing and no polling.
    pub fn backend() -> (tempfile::TempDir, LocalBackend) {
        backend_with(LocalOptions {
            poll_interval: None,
            bcrypt_cost: 4,
            ..LocalOptions::default()
        })
    }

    pub fn backend_with(options: LocalOptions) -> (tempfile::TempDir, LocalBackend) {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LocalBackend::open(&tmp.path().join("framez.db"), options).unwrap();
        (tmp, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_is_alphanumeric() {
        let id = generate_id(20);
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_id(20));
    }

    #[test]
    fn default_options_index_the_feed() {
        let options = LocalOptions::default();
        assert!(options.indexes.contains("posts.createdAt"));
        assert_eq!(options.poll_interval, Some(Duration::from_millis(1000)));
    }

    #[test]
    fn fresh_backend_has_no_session() {
        let (_tmp, backend) = testing::backend();
        assert!(load_session_user(backend.pool()).unwrap().is_none());
    }
}
