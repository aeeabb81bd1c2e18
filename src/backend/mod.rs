//! The remote collaborator: credential auth plus a document store with
//! live queries. Services only talk to these traits.

mod error;
pub mod local;
mod query;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::models::AuthUser;

pub use self::error::{BackendError, ErrorCode};
pub use self::query::{Direction, FieldFilter, OrderBy, Query};

pub type BackendResult<T> = Result<T, BackendError>;

/// A stored document: its id and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// A single field write applied atomically with the rest of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    /// Append each element not already present.
    ArrayUnion(Vec<Value>),
    /// Remove every element equal to one of these.
    ArrayRemove(Vec<Value>),
}

/// Receives the full result set of a live query each time it changes, or
/// the error that terminated the listener.
pub type SnapshotCallback = Box<dyn FnMut(BackendResult<Vec<Document>>) + Send + 'static>;

/// Handle to a running listener. Cancelling is explicit; dropping the handle
/// leaves the listener running.
#[derive(Debug)]
pub struct ListenerHandle {
    abort: AbortHandle,
}

impl ListenerHandle {
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort }
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Create a credential and sign it in.
    async fn create_user(&self, email: &str, password: &str) -> BackendResult<AuthUser>;

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthUser>;

    async fn sign_out(&self) -> BackendResult<()>;

    /// Update the signed-in user's display name and/or photo URL.
    async fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> BackendResult<AuthUser>;

    async fn send_password_reset_email(&self, email: &str) -> BackendResult<()>;

    /// The persisted credential, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// Auth-state notifications; the current value is the signed-in user.
    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Document>>;

    /// Insert a document under a generated id and return the id.
    async fn add(&self, collection: &str, data: Value) -> BackendResult<String>;

    /// Create or overwrite a document.
    async fn set(&self, collection: &str, id: &str, data: Value) -> BackendResult<()>;

    /// Apply field updates atomically. Fails with `not-found` if the
    /// document does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<(String, FieldUpdate)>,
    ) -> BackendResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<()>;

    async fn query(&self, query: &Query) -> BackendResult<Vec<Document>>;

    /// Start a live query. The callback gets the initial result set, then the
    /// full set again after every change. Must be called within a tokio runtime.
    fn listen(&self, query: Query, callback: SnapshotCallback) -> ListenerHandle;
}
