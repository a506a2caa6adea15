//! Error types for TransCargo.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Valid consent is required")]
    ConsentRequired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid ciphertext")]
    InvalidCiphertext,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Audit trail unavailable: {0}")]
    AuditUnavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a background job failing with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_)
                | Error::Upstream(_)
                | Error::Timeout(_)
                | Error::StoreUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::RateLimited("3/min".into()).is_retryable());
        assert!(Error::Upstream("502".into()).is_retryable());
        assert!(Error::Timeout("hard limit".into()).is_retryable());
        assert!(!Error::Validation("bad slug".into()).is_retryable());
        assert!(!Error::InvalidCiphertext.is_retryable());
        assert!(!Error::NotFound("country XX".into()).is_retryable());
    }

    #[test]
    fn test_consent_message_is_stable() {
        assert_eq!(Error::ConsentRequired.to_string(), "Valid consent is required");
    }
}
