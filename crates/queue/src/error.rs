//! Error types for queue construction.

use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Queue error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid rate limit: {reason}")]
    InvalidRateLimit { reason: String },
}

impl Error {
    /// Create an invalid rate limit error.
    pub fn invalid_rate_limit(reason: impl Into<String>) -> Self {
        Self::InvalidRateLimit {
            reason: reason.into(),
        }
    }
}
