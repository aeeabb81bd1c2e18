use std::fmt;

/// Error codes reported by the backend. Auth codes use the `auth/` prefix,
/// document-store codes are bare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidEmail,
    UserDisabled,
    UserNotFound,
    WrongPassword,
    EmailAlreadyInUse,
    WeakPassword,
    OperationNotAllowed,
    TooManyRequests,
    NetworkRequestFailed,
    InvalidCredential,
    NotFound,
    FailedPrecondition,
    InvalidArgument,
    AlreadyExists,
    Unavailable,
    Internal,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InvalidEmail => "auth/invalid-email",
            ErrorCode::UserDisabled => "auth/user-disabled",
            ErrorCode::UserNotFound => "auth/user-not-found",
            ErrorCode::WrongPassword => "auth/wrong-password",
            ErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            ErrorCode::WeakPassword => "auth/weak-password",
            ErrorCode::OperationNotAllowed => "auth/operation-not-allowed",
            ErrorCode::TooManyRequests => "auth/too-many-requests",
            ErrorCode::NetworkRequestFailed => "auth/network-request-failed",
            ErrorCode::InvalidCredential => "auth/invalid-credential",
            ErrorCode::NotFound => "not-found",
            ErrorCode::FailedPrecondition => "failed-precondition",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::AlreadyExists => "already-exists",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Internal => "internal",
            ErrorCode::Other(code) => code,
        }
    }

    pub fn parse(code: &str) -> Self {
        match code {
            "auth/invalid-email" => ErrorCode::InvalidEmail,
            "auth/user-disabled" => ErrorCode::UserDisabled,
            "auth/user-not-found" => ErrorCode::UserNotFound,
            "auth/wrong-password" => ErrorCode::WrongPassword,
            "auth/email-already-in-use" => ErrorCode::EmailAlreadyInUse,
            "auth/weak-password" => ErrorCode::WeakPassword,
            "auth/operation-not-allowed" => ErrorCode::OperationNotAllowed,
            "auth/too-many-requests" => ErrorCode::TooManyRequests,
            "auth/network-request-failed" => ErrorCode::NetworkRequestFailed,
            "auth/invalid-credential" => ErrorCode::InvalidCredential,
            "not-found" => ErrorCode::NotFound,
            "failed-precondition" => ErrorCode::FailedPrecondition,
            "invalid-argument" => ErrorCode::InvalidArgument,
            "already-exists" => ErrorCode::AlreadyExists,
            "unavailable" => ErrorCode::Unavailable,
            "internal" => ErrorCode::Internal,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    pub fn is_auth(&self) -> bool {
        self.as_str().starts_with("auth/")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned by a backend call. The code is propagated unmodified
/// so callers can map it to a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct BackendError {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// True for a missing-index style failure on an ordered query.
    pub fn is_missing_index(&self) -> bool {
        self.code == ErrorCode::FailedPrecondition || self.message.contains("index")
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        tracing::error!("Database error: {}", e);
        BackendError::internal(e.to_string())
    }
}

impl From<r2d2::Error> for BackendError {
    fn from(e: r2d2::Error) -> Self {
        tracing::error!("Pool error: {}", e);
        BackendError::new(ErrorCode::Unavailable, e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::new(ErrorCode::InvalidArgument, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_wire_strings() {
        for code in [
            ErrorCode::InvalidEmail,
            ErrorCode::UserNotFound,
            ErrorCode::InvalidCredential,
            ErrorCode::NotFound,
            ErrorCode::FailedPrecondition,
        ] {
            assert_eq!(ErrorCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn unknown_code_is_preserved() {
        let code = ErrorCode::parse("auth/quota-exceeded");
        assert_eq!(code, ErrorCode::Other("auth/quota-exceeded".into()));
        assert_eq!(code.as_str(), "auth/quota-exceeded");
        assert!(code.is_auth());
    }

    #[test]
    fn missing_index_detection() {
        let by_code = BackendError::new(ErrorCode::FailedPrecondition, "nope");
        let by_message = BackendError::internal("The query requires an index");
        let other = BackendError::not_found("gone");
        assert!(by_code.is_missing_index());
        assert!(by_message.is_missing_index());
        assert!(!other.is_missing_index());
    }

    #[test]
    fn display_includes_code() {
        let err = BackendError::new(ErrorCode::WeakPassword, "too short");
        assert_eq!(err.to_string(), "too short (auth/weak-password)");
    }
}
