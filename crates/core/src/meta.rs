//! Object metadata: identity, concurrency token, and the mutable metadata
//! zone (labels, annotations, finalizers, owner references).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::{ObjectKey, encode_key};

/// Reference from a subordinate object to an object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Api version of the owner (`group/version` or `version`).
    pub api_version: String,
    /// Kind of the owner.
    pub kind: String,
    /// Name of the owner, in the same namespace as the subordinate.
    pub name: String,
    /// Unique id of the owner.
    pub uid: String,
    /// Whether this owner is the managing controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    /// Whether the owner cannot be deleted before this object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl OwnerReference {
    /// Whether this reference carries the controller flag.
    pub fn is_controller(&self) -> bool {
        self.controller.unwrap_or(false)
    }
}

/// Metadata shared by every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Namespace, empty for cluster-scoped resources.
    #[serde(default)]
    pub namespace: String,
    /// Name, unique within the namespace.
    pub name: String,
    /// Unique id assigned by the store on creation.
    #[serde(default)]
    pub uid: String,
    /// Optimistic-concurrency token assigned by the store on every write.
    #[serde(default)]
    pub resource_version: String,
    /// Incremented by the store whenever the spec changes.
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Deletion marker. Set by the store when deletion is requested while
    /// finalizers are still present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a namespaced object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Metadata for a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    /// The queue key of this object.
    pub fn key(&self) -> String {
        encode_key(&self.namespace, &self.name)
    }

    /// The decoded key of this object.
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Whether a deletion has been requested.
    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is present.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer. Returns `false` if it was already present.
    pub fn add_finalizer(&mut self, finalizer: impl Into<String>) -> bool {
        let finalizer = finalizer.into();
        if self.has_finalizer(&finalizer) {
            return false;
        }
        self.finalizers.push(finalizer);
        true
    }

    /// Remove a finalizer. Returns `false` if it was not present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    /// Builder-style label setter.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder-style annotation setter.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Builder-style finalizer setter.
    #[must_use]
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.add_finalizer(finalizer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_for_namespaced_and_cluster_objects() {
        assert_eq!(ObjectMeta::new("default", "web").key(), "default/web");
        assert_eq!(ObjectMeta::cluster("node-1").key(), "node-1");
    }

    #[test]
    fn test_finalizer_helpers() {
        let mut meta = ObjectMeta::new("default", "web");
        assert!(meta.add_finalizer("example.com/cleanup"));
        assert!(!meta.add_finalizer("example.com/cleanup"));
        assert!(meta.has_finalizer("example.com/cleanup"));
        assert!(meta.remove_finalizer("example.com/cleanup"));
        assert!(!meta.remove_finalizer("example.com/cleanup"));
        assert!(meta.finalizers.is_empty());
    }

    #[test]
    fn test_deletion_marker() {
        let mut meta = ObjectMeta::new("default", "web");
        assert!(!meta.is_being_deleted());
        meta.deletion_timestamp = Some(Utc::now());
        assert!(meta.is_being_deleted());
    }

    #[test]
    fn test_owner_reference_serializes_camel_case() {
        let reference = OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "web".to_string(),
            uid: "1234".to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        };
        let json = serde_json::to_string(&reference).unwrap_or_default();
        assert!(json.contains("\"apiVersion\":\"apps/v1\""));
        assert!(!json.contains("blockOwnerDeletion"));
    }
}
