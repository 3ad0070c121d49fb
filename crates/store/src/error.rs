//! Error types for resource client operations.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by a [`crate::ResourceClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },

    /// Optimistic-concurrency failure: the object changed since it was read.
    #[error("conflict writing {kind} '{key}': {reason}")]
    Conflict {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: String, key: String },

    #[error("invalid request: {reason}")]
    Invalid { reason: String },

    #[error("cache failed to sync: {reason}")]
    CacheSync { reason: String },

    #[error("watch failed: {reason}")]
    Watch { reason: String },

    #[error("internal client error: {reason}")]
    Internal { reason: String },
}

impl ClientError {
    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(
        kind: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Create a cache sync error.
    pub fn cache_sync(reason: impl Into<String>) -> Self {
        Self::CacheSync {
            reason: reason.into(),
        }
    }

    /// Create a watch error.
    pub fn watch(reason: impl Into<String>) -> Self {
        Self::Watch {
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
