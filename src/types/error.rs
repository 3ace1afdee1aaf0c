//! Error types for Agora
//!
//! Every fallible path in the crate ends in [`AgoraError`]; the HTTP layer
//! maps it to a status code with [`AgoraError::status_code`].

use hyper::StatusCode;

/// Main error type for Agora operations
#[derive(Debug, thiserror::Error)]
pub enum AgoraError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Lease races, duplicate write slots, exhausted quotas
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A required collaborator (signing key, object store, STS) is not configured
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Store operation exceeded its deadline; safe for the caller to retry
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgoraError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ObjectStore(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Database(_))
    }

    /// Short machine-readable label used in response bodies
    pub fn label(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::Http(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Timeout(_) => "timeout",
            Self::Database(_) | Self::ObjectStore(_) => "unavailable",
            Self::Internal(_) | Self::Config(_) => "internal",
        }
    }

    /// Message safe to return to clients.
    ///
    /// Store and internal failures are logged with full detail by the
    /// caller and replaced here with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) => "storage temporarily unavailable".to_string(),
            Self::ObjectStore(_) => "object store unavailable".to_string(),
            Self::Internal(_) | Self::Config(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for AgoraError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AgoraError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for AgoraError {
    fn from(err: hyper::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<mongodb::error::Error> for AgoraError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for AgoraError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AgoraError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

impl From<reqwest::Error> for AgoraError {
    fn from(err: reqwest::Error) -> Self {
        Self::ObjectStore(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AgoraError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout("operation deadline exceeded".to_string())
    }
}

/// Result type alias for Agora operations
pub type Result<T> = std::result::Result<T, AgoraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AgoraError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AgoraError::PreconditionFailed("no key".into()).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(AgoraError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AgoraError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_detail_hidden() {
        let err = AgoraError::Internal("mongo pool exhausted at 10.0.0.4".into());
        assert_eq!(err.public_message(), "internal server error");

        let err = AgoraError::Conflict("work item already claimed".into());
        assert!(err.public_message().contains("already claimed"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        assert!(AgoraError::Timeout("slow".into()).is_retryable());
        assert!(!AgoraError::Forbidden("no".into()).is_retryable());
    }
}
