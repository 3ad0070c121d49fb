//! Read-only views over an informer cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use converge_core::{Resource, encode_key};
use parking_lot::RwLock;

use crate::error::{ClientError, Result};
use crate::selector::LabelSelector;

pub(crate) type Cache<T> = Arc<RwLock<BTreeMap<String, T>>>;

/// Cache-backed lister for one collection.
#[derive(Clone)]
pub struct Lister<T> {
    cache: Cache<T>,
}

impl<T: Resource> Lister<T> {
    pub(crate) fn new(cache: Cache<T>) -> Self {
        Self { cache }
    }

    /// Every cached object matching `selector`, ordered by key.
    pub fn list(&self, selector: &LabelSelector) -> Vec<T> {
        self.cache
            .read()
            .values()
            .filter(|obj| selector.matches(&obj.meta().labels))
            .cloned()
            .collect()
    }

    /// A cluster-scoped object by name.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if the object is not cached.
    pub fn get(&self, name: &str) -> Result<T> {
        self.get_by_key(name)
    }

    /// An object by its queue key.
    pub fn get_by_key(&self, key: &str) -> Result<T> {
        self.cache
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(T::gvk().kind, key))
    }

    /// A lister scoped to one namespace.
    pub fn by_namespace(&self, namespace: impl Into<String>) -> NamespaceLister<T> {
        NamespaceLister {
            cache: Arc::clone(&self.cache),
            namespace: namespace.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

/// Lister restricted to a single namespace.
#[derive(Clone)]
pub struct NamespaceLister<T> {
    cache: Cache<T>,
    namespace: String,
}

impl<T: Resource> NamespaceLister<T> {
    pub fn list(&self, selector: &LabelSelector) -> Vec<T> {
        self.cache
            .read()
            .values()
            .filter(|obj| obj.meta().namespace == self.namespace)
            .filter(|obj| selector.matches(&obj.meta().labels))
            .cloned()
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if the object is not cached.
    pub fn get(&self, name: &str) -> Result<T> {
        let key = encode_key(&self.namespace, name);
        self.cache
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(T::gvk().kind, key))
    }
}
