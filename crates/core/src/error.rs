//! Core error types for resource identity and metadata operations.
//!
//! All errors are explicit and typed; nothing in this crate panics.

use thiserror::Error;

/// Core error type for converge operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Key codec errors
    #[error("invalid resource key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    // Type identity errors
    #[error("invalid api version '{api_version}': {reason}")]
    InvalidApiVersion { api_version: String, reason: String },

    // Ownership errors
    #[error("object '{object}' is already controlled by {kind} '{owner}'")]
    AlreadyControlled {
        object: String,
        kind: String,
        owner: String,
    },

    #[error("owner '{owner}' has no uid; it must be persisted before it can own objects")]
    MissingOwnerUid { owner: String },
}

impl Error {
    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid api version error.
    pub fn invalid_api_version(api_version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidApiVersion {
            api_version: api_version.into(),
            reason: reason.into(),
        }
    }

    /// Create an already-controlled error.
    pub fn already_controlled(
        object: impl Into<String>,
        kind: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self::AlreadyControlled {
            object: object.into(),
            kind: kind.into(),
            owner: owner.into(),
        }
    }

    /// Create a missing owner uid error.
    pub fn missing_owner_uid(owner: impl Into<String>) -> Self {
        Self::MissingOwnerUid {
            owner: owner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_display() {
        let err = Error::invalid_key("a/b/c", "too many segments");
        assert!(err.to_string().contains("a/b/c"));
        assert!(err.to_string().contains("too many segments"));
    }

    #[test]
    fn test_already_controlled_display() {
        let err = Error::already_controlled("default/web-1", "ReplicaSet", "web");
        let message = err.to_string();
        assert!(message.contains("default/web-1"));
        assert!(message.contains("ReplicaSet"));
        assert!(message.contains("'web'"));
    }
}
