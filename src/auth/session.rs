use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::backend::{AuthBackend, BackendError, ErrorCode};
use crate::error::{FramezError, FramezResult};
use crate::models::AuthUser;
use crate::services::users::{normalize_username, UserService};

/// Snapshot of the client's auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub loading: bool,
    pub initialized: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
            initialized: false,
        }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.initialized && self.user.is_some()
    }
}

/// Owns the current identity for one client. Construct one per session;
/// nothing here is global.
pub struct SessionStore {
    auth: Arc<dyn AuthBackend>,
    users: UserService,
    state: Arc<RwLock<SessionState>>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthBackend>, users: UserService) -> Self {
        Self {
            auth,
            users,
            state: Arc::new(RwLock::new(SessionState::default())),
            follower: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.state.read().await.user.clone()
    }

    /// Adopt the backend's persisted credential, then keep following its
    /// auth-state changes in the background.
    pub async fn initialize(&self) {
        let mut changes = self.auth.auth_state();
        let user = changes.borrow_and_update().clone();

        {
            let mut state = self.state.write().await;
            state.user = user;
            state.loading = false;
            state.initialized = true;
        }
        tracing::debug!("Session initialized");

        let state = self.state.clone();
        let follower = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let user = changes.borrow_and_update().clone();
                state.write().await.user = user;
            }
        });

        let previous = self
            .follower
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(follower);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Create the account, set its display name, write its profile and sign
    /// it in.
    pub async fn sign_up(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> FramezResult<AuthUser> {
        let created = self
            .auth
            .create_user(email.trim(), password)
            .await
            .map_err(FramezError::Auth)?;

        let username = normalize_username(username);
        let user = self
            .auth
            .update_profile(Some(&username), None)
            .await
            .map_err(FramezError::Auth)?;
        self.users.create_user_profile(&user, &username).await?;

        tracing::info!("Signed up {} as {}", created.uid, username);
        self.set_user(Some(user.clone())).await;
        Ok(user)
    }

    /// Sign in with an email, or with a username that is resolved to one.
    pub async fn sign_in(&self, identifier: &str, password: &str) -> FramezResult<AuthUser> {
        let identifier = identifier.trim();

        let email = if identifier.contains('@') {
            identifier.to_string()
        } else {
            self.users
                .find_email_by_username(identifier)
                .await?
                .ok_or_else(|| {
                    FramezError::Auth(BackendError::new(
                        ErrorCode::UserNotFound,
                        format!("No user found with username {}", identifier),
                    ))
                })?
        };

        let user = self
            .auth
            .sign_in(&email, password)
            .await
            .map_err(FramezError::Auth)?;

        tracing::info!("Signed in {}", user.uid);
        self.set_user(Some(user.clone())).await;
        Ok(user)
    }

    pub async fn sign_out(&self) -> FramezResult<()> {
        self.auth
            .sign_out()
            .await
            .map_err(|e| FramezError::operation("Failed to sign out", e))?;
        self.set_user(None).await;
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> FramezResult<()> {
        self.auth
            .send_password_reset_email(email.trim())
            .await
            .map_err(FramezError::Auth)
    }

    /// Stop following backend auth-state changes.
    pub fn shutdown(&self) {
        let follower = self
            .follower
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(follower) = follower {
            follower.abort();
        }
    }

    /// A completed sign-in or sign-out settles the state even before
    /// `initialize` has run.
    async fn set_user(&self, user: Option<AuthUser>) {
        let mut state = self.state.write().await;
        state.user = user;
        state.loading = false;
        state.initialized = true;
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
