use crate::auth::errors::auth_error_message;
use crate::backend::{BackendError, ErrorCode};
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum FramezError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Authentication failure; the backend code is kept for message mapping.
    #[error("{}", .0.message)]
    Auth(BackendError),

    /// A data operation failed; `message` is what the user sees.
    #[error("{message}")]
    Operation {
        message: String,
        #[source]
        source: Option<BackendError>,
    },

    #[error("{0}")]
    Media(String),
}

impl FramezError {
    /// Wrap a backend failure, keeping its message when it has one.
    pub fn operation(fallback: &str, err: BackendError) -> Self {
        tracing::error!("{}: {} ({})", fallback, err.message, err.code);
        let message = if err.message.trim().is_empty() {
            fallback.to_string()
        } else {
            err.message.clone()
        };
        FramezError::Operation {
            message,
            source: Some(err),
        }
    }

    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            FramezError::Auth(e) => Some(&e.code),
            FramezError::Operation {
                source: Some(e), ..
            } => Some(&e.code),
            _ => None,
        }
    }

    /// The sentence to show for this error.
    pub fn user_message(&self) -> String {
        match self {
            FramezError::Auth(e) => auth_error_message(e.code.as_str()).to_string(),
            other => other.to_string(),
        }
    }
}

impl From<BackendError> for FramezError {
    fn from(e: BackendError) -> Self {
        if e.code.is_auth() {
            FramezError::Auth(e)
        } else {
            FramezError::Operation {
                message: e.message.clone(),
                source: Some(e),
            }
        }
    }
}

pub type FramezResult<T> = Result<T, FramezError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_keeps_backend_message() {
        let err = FramezError::operation(
            "Failed to like post",
            BackendError::not_found("No document to update: posts/p1"),
        );
        assert_eq!(err.to_string(), "No document to update: posts/p1");
        assert_eq!(err.code(), Some(&ErrorCode::NotFound));
    }

    #[test]
    fn operation_falls_back_when_message_empty() {
        let err = FramezError::operation("Failed to delete post", BackendError::internal(""));
        assert_eq!(err.to_string(), "Failed to delete post");
    }

    #[test]
    fn auth_errors_map_through_table() {
        let err: FramezError =
            BackendError::new(ErrorCode::WeakPassword, "Password should be longer").into();
        assert!(matches!(err, FramezError::Auth(_)));
        assert_eq!(
            err.user_message(),
            "Password is too weak. Please use at least 6 characters"
        );
    }

    #[test]
    fn non_auth_backend_errors_become_operations() {
        let err: FramezError = BackendError::internal("disk full").into();
        assert!(matches!(err, FramezError::Operation { .. }));
        assert_eq!(err.user_message(), "disk full");
    }

    #[test]
    fn config_errors_name_the_variable() {
        let err: FramezError = ConfigError::Missing("FRAMEZ_BACKEND_API_KEY").into();
        assert_eq!(
            err.to_string(),
            "Configuration error: missing required setting FRAMEZ_BACKEND_API_KEY"
        );
    }
}
