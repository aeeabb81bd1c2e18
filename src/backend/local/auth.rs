use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tokio::sync::watch;

use super::{generate_id, row_to_user, LocalBackend};
use crate::backend::{AuthBackend, BackendError, BackendResult, ErrorCode};
use crate::models::AuthUser;

const MIN_PASSWORD_LEN: usize = 6;
const RESET_CODE_LEN: usize = 32;
const RESET_TTL_HOURS: u32 = 1;

struct StoredCredential {
    user: AuthUser,
    password_hash: String,
    disabled: bool,
}

impl LocalBackend {
    fn find_credential(&self, email: &str) -> BackendResult<Option<StoredCredential>> {
        let conn = self.inner.db.get()?;
        let found = conn
            .query_row(
                "SELECT uid, email, display_name, photo_url, password_hash, disabled
                 FROM auth_users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(StoredCredential {
                        user: row_to_user(row)?,
                        password_hash: row.get(4)?,
                        disabled: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    fn persist_session(&self, user: &AuthUser) -> BackendResult<()> {
        let conn = self.inner.db.get()?;
        conn.execute(
            "INSERT INTO auth_session (slot, uid) VALUES (1, ?1)
             ON CONFLICT(slot) DO UPDATE SET uid = excluded.uid, signed_in_at = datetime('now')",
            params![user.uid],
        )?;
        self.inner.auth_state.send_replace(Some(user.clone()));
        Ok(())
    }
}

/// Lower-case and validate an email address.
fn normalize_email(email: &str) -> BackendResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(BackendError::new(
            ErrorCode::InvalidEmail,
            "The email address is badly formatted.",
        ))
    }
}

fn invalid_credential() -> BackendError {
    BackendError::new(ErrorCode::InvalidCredential, "Invalid email or password.")
}

#[async_trait]
impl AuthBackend for LocalBackend {
    async fn create_user(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        let email = normalize_email(email)?;

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::new(
                ErrorCode::WeakPassword,
                "Password should be at least 6 characters.",
            ));
        }

        if self.find_credential(&email)?.is_some() {
            return Err(BackendError::new(
                ErrorCode::EmailAlreadyInUse,
                "The email address is already in use by another account.",
            ));
        }

        let password_hash = bcrypt::hash(password, self.inner.options.bcrypt_cost)
            .map_err(|e| BackendError::internal(format!("Failed to hash password: {}", e)))?;

        let user = AuthUser {
            uid: uuid::Uuid::now_v7().simple().to_string(),
            email: Some(email),
            display_name: None,
            photo_url: None,
        };

        {
            let conn = self.inner.db.get()?;
            conn.execute(
                "INSERT INTO auth_users (uid, email, password_hash) VALUES (?1, ?2, ?3)",
                params![user.uid, user.email, password_hash],
            )?;
        }

        tracing::info!("Created account {}", user.uid);
        self.persist_session(&user)?;
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthUser> {
        let email = normalize_email(email)?;

        let credential = self.find_credential(&email)?.ok_or_else(invalid_credential)?;

        if credential.disabled {
            return Err(BackendError::new(
                ErrorCode::UserDisabled,
                "The user account has been disabled.",
            ));
        }

        let matches = bcrypt::verify(password, &credential.password_hash)
            .map_err(|e| BackendError::internal(format!("Failed to verify password: {}", e)))?;
        if !matches {
            tracing::warn!("Failed sign-in for {}", credential.user.uid);
            return Err(invalid_credential());
        }

        self.persist_session(&credential.user)?;
        Ok(credential.user)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        {
            let conn = self.inner.db.get()?;
            conn.execute("DELETE FROM auth_session WHERE slot = 1", [])?;
        }
        self.inner.auth_state.send_replace(None);
        Ok(())
    }

    async fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> BackendResult<AuthUser> {
        let mut user = self.current_user().ok_or_else(|| {
            BackendError::new(
                ErrorCode::Other("auth/no-current-user".into()),
                "No user is currently signed in.",
            )
        })?;

        if let Some(name) = display_name {
            user.display_name = Some(name.to_string());
        }
        if let Some(url) = photo_url {
            user.photo_url = Some(url.to_string());
        }

        {
            let conn = self.inner.db.get()?;
            conn.execute(
                "UPDATE auth_users SET display_name = ?1, photo_url = ?2 WHERE uid = ?3",
                params![user.display_name, user.photo_url, user.uid],
            )?;
        }

        self.inner.auth_state.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn send_password_reset_email(&self, email: &str) -> BackendResult<()> {
        let email = normalize_email(email)?;

        let credential = self.find_credential(&email)?.ok_or_else(|| {
            BackendError::new(
                ErrorCode::UserNotFound,
                "There is no user record corresponding to this identifier.",
            )
        })?;

        let code = generate_id(RESET_CODE_LEN);
        let conn = self.inner.db.get()?;
        // One live code per user; expired codes are dropped.
        conn.execute(
            "DELETE FROM password_resets WHERE uid = ?1 OR expires_at < datetime('now')",
            params![credential.user.uid],
        )?;
        conn.execute(
            "INSERT INTO password_resets (code, uid, email, expires_at)
             VALUES (?1, ?2, ?3, datetime('now', ?4))",
            params![
                code,
                credential.user.uid,
                email,
                format!("+{} hours", RESET_TTL_HOURS)
            ],
        )?;

        tracing::info!("Password reset requested for {}", credential.user.uid);
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.inner.auth_state.borrow().clone()
    }

    fn auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.inner.auth_state.subscribe()
    }
}
