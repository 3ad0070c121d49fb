//! Error types for the reconciler crate.

use std::fmt;

use converge_store::ClientError;
use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The zone a persistence step writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Metadata,
    Status,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata => write!(f, "metadata"),
            Self::Status => write!(f, "status"),
        }
    }
}

/// Controller error types.
#[derive(Debug, Error)]
pub enum Error {
    /// A queue key could not be decoded.
    #[error(transparent)]
    InvalidKey(#[from] converge_core::Error),

    /// Writing a changed zone failed, after conflict retries where applicable.
    #[error("failed to update {zone}: {source}")]
    Persist {
        zone: Zone,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    /// An informer did not finish its initial list in time.
    #[error("cache for {kind} failed to sync: {reason}")]
    CacheSync { kind: String, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a persistence error.
    pub fn persist(zone: Zone, source: ClientError) -> Self {
        Self::Persist { zone, source }
    }

    /// Create a cache sync error.
    pub fn cache_sync(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CacheSync {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this error wraps an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Persist { source, .. } | Self::Client(source) => source.is_conflict(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_display_names_zone() {
        let err = Error::persist(
            Zone::Status,
            ClientError::conflict("Widget", "default/w1", "stale"),
        );
        assert!(err.to_string().starts_with("failed to update status"));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_key_errors_convert() {
        let err: Error = converge_core::Error::invalid_key("a/b/c", "too many segments").into();
        assert!(matches!(err, Error::InvalidKey(_)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_cache_sync_display() {
        let err = Error::cache_sync("Widget", "timed out after 5s");
        assert_eq!(
            err.to_string(),
            "cache for Widget failed to sync: timed out after 5s"
        );
    }
}
