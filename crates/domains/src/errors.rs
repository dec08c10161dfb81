//! # DomainError
//!
//! Centralized error handling for the comment service.
//! Maps use-case failures to actionable error types; adapters decide how to render them.

use thiserror::Error;

/// The primary error type for all comment use cases.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Resource not found (e.g., a comment id on delete)
    #[error("{0} not found")]
    NotFound(String),

    /// Validation failure (e.g., missing author, content too long, unknown parent)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Identity exceeded its comment allowance for the current window
    #[error("too many requests: {0}")]
    RateLimitExceeded(String),

    /// Infrastructure failure (e.g., database unreachable)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Message safe to hand back to a client.
    pub fn public_message(&self) -> String {
        match self {
            DomainError::NotFound(what) => format!("{what} not found"),
            DomainError::ValidationError(msg) | DomainError::RateLimitExceeded(msg) => msg.clone(),
            DomainError::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        DomainError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for comment service logic.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_are_not_public() {
        let err = DomainError::from(anyhow::anyhow!("disk I/O error at /var/lib/comments.db"));
        assert!(err.to_string().contains("disk I/O error"));
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = DomainError::ValidationError("content is required".into());
        assert_eq!(err.public_message(), "content is required");
        assert_eq!(DomainError::NotFound("Comment".into()).public_message(), "Comment not found");
    }
}
