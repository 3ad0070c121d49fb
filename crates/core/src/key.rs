//! Resource key codec.
//!
//! A key is the single string form of a `(namespace, name)` pair. It is the
//! element type of the work queue and the index of every cache:
//!
//! - namespaced resources encode as `namespace/name`
//! - cluster-scoped resources encode as `name`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Separator between namespace and name.
pub const KEY_SEPARATOR: char = '/';

/// Decoded form of a resource key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace, empty for cluster-scoped resources.
    pub namespace: String,
    /// Resource name.
    pub name: String,
}

impl ObjectKey {
    /// Create a key for a namespaced resource.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a key for a cluster-scoped resource.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    /// Whether the key refers to a cluster-scoped resource.
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Encode to the queue string form.
    pub fn encode(&self) -> String {
        encode_key(&self.namespace, &self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{KEY_SEPARATOR}{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode_key(s)
    }
}

/// Encode a `(namespace, name)` pair into a key.
pub fn encode_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}{KEY_SEPARATOR}{name}")
    }
}

/// Decode a key into its `(namespace, name)` pair.
///
/// # Errors
///
/// Returns [`Error::InvalidKey`] when the key has more than one separator
/// or an empty name.
pub fn decode_key(key: &str) -> Result<ObjectKey> {
    let mut parts = key.split(KEY_SEPARATOR);
    let key_parts = (parts.next(), parts.next(), parts.next());

    let decoded = match key_parts {
        (Some(name), None, None) => ObjectKey::cluster(name),
        (Some(namespace), Some(name), None) => ObjectKey::new(namespace, name),
        _ => return Err(Error::invalid_key(key, "unexpected key format")),
    };

    if decoded.name.is_empty() {
        return Err(Error::invalid_key(key, "name must not be empty"));
    }

    Ok(decoded)
}
