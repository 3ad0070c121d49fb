//! In-memory resource store.
//!
//! Behaves like a remote API server for one collection:
//!
//! - uids and creation timestamps are assigned on create
//! - every write bumps the resource version; a stale version is a conflict
//! - `update` never touches status and `update_status` never touches anything else
//! - deleting an object with finalizers only sets the deletion marker; the
//!   object is removed once an update clears its last finalizer
//! - every change is broadcast to informers

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use converge_core::{Resource, StopSignal, encode_key};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::client::{EventHandler, InformOptions, ResourceClient};
use crate::error::{ClientError, Result};
use crate::lister::{Cache, Lister};

const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// A change broadcast to informers.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(T),
    Modified { old: T, new: T },
    Deleted(T),
}

struct Inner<T> {
    objects: Mutex<BTreeMap<String, T>>,
    events: broadcast::Sender<WatchEvent<T>>,
    resource_version: AtomicU64,
    injected_conflicts: AtomicU32,
    writes: AtomicU64,
}

/// In-memory implementation of [`ResourceClient`].
///
/// Cheap to clone; clones share the same objects.
pub struct MemoryStore<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Resource> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> MemoryStore<T> {
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    /// Create a store whose watch channel buffers `capacity` events per
    /// informer before it lags and relists.
    pub fn with_watch_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                objects: Mutex::new(BTreeMap::new()),
                events,
                resource_version: AtomicU64::new(0),
                injected_conflicts: AtomicU32::new(0),
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Make the next `count` writes fail with a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.inner.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes that changed an object.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Store a new object.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyExists`] if the key is taken and
    /// [`ClientError::Invalid`] if the object has no name.
    pub async fn create(&self, obj: T) -> Result<T> {
        let key = obj.key();
        if obj.meta().name.is_empty() {
            return Err(ClientError::invalid("object name must not be empty"));
        }

        let mut objects = self.inner.objects.lock();
        if objects.contains_key(&key) {
            return Err(ClientError::already_exists(T::gvk().kind, key));
        }

        let mut created = obj;
        {
            let meta = created.meta_mut();
            if meta.uid.is_empty() {
                meta.uid = Uuid::new_v4().to_string();
            }
            meta.resource_version = self.next_version();
            meta.generation = 1;
            meta.creation_timestamp = Some(Utc::now());
            meta.deletion_timestamp = None;
        }

        objects.insert(key.clone(), created.clone());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.events.send(WatchEvent::Added(created.clone()));
        debug!(kind = %T::gvk().kind, key = %key, "created object");
        Ok(created)
    }

    /// Request deletion.
    ///
    /// Objects without finalizers are removed at once. Otherwise the deletion
    /// marker is set and removal waits for the finalizers to be cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if the object does not exist.
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let key = encode_key(namespace, name);
        let mut objects = self.inner.objects.lock();
        let current = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(T::gvk().kind, &key))?;

        if current.meta().finalizers.is_empty() {
            objects.remove(&key);
            let _ = self.inner.events.send(WatchEvent::Deleted(current));
            debug!(kind = %T::gvk().kind, key = %key, "deleted object");
            return Ok(());
        }

        if current.meta().is_being_deleted() {
            return Ok(());
        }

        let mut marked = current.clone();
        marked.meta_mut().deletion_timestamp = Some(Utc::now());
        marked.meta_mut().resource_version = self.next_version();
        objects.insert(key.clone(), marked.clone());
        let _ = self.inner.events.send(WatchEvent::Modified {
            old: current,
            new: marked,
        });
        debug!(kind = %T::gvk().kind, key = %key, "marked object for deletion");
        Ok(())
    }

    /// Every stored object, ordered by key.
    pub async fn list(&self) -> Vec<T> {
        self.inner.objects.lock().values().cloned().collect()
    }

    /// Whether an object with this key exists.
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.inner
            .objects
            .lock()
            .contains_key(&encode_key(namespace, name))
    }

    /// Replace spec and metadata without a resource-version check, as an
    /// external writer that does not read first would.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if the object does not exist.
    pub async fn force_update(&self, namespace: &str, obj: &T) -> Result<T> {
        let mut unversioned = obj.clone();
        unversioned.meta_mut().resource_version.clear();
        self.update(namespace, &unversioned).await
    }

    fn next_version(&self) -> String {
        (self.inner.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn check_write(&self, key: &str, requested: &str, current: &T) -> Result<()> {
        let injected = self
            .inner
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ClientError::conflict(
                T::gvk().kind,
                key,
                "injected conflict",
            ));
        }

        let stored = &current.meta().resource_version;
        if !requested.is_empty() && requested != stored {
            return Err(ClientError::conflict(
                T::gvk().kind,
                key,
                format!("resource version {requested} is stale, latest is {stored}"),
            ));
        }
        Ok(())
    }

    fn lookup(objects: &BTreeMap<String, T>, namespace: &str, obj: &T) -> Result<(String, T)> {
        if obj.meta().namespace != namespace {
            return Err(ClientError::invalid(format!(
                "namespace '{namespace}' does not match object namespace '{}'",
                obj.meta().namespace
            )));
        }
        let key = encode_key(namespace, &obj.meta().name);
        let current = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(T::gvk().kind, &key))?;
        Ok((key, current))
    }

    fn snapshot(&self, options: &InformOptions) -> (Vec<T>, broadcast::Receiver<WatchEvent<T>>) {
        let objects = self.inner.objects.lock();
        let selected = objects
            .values()
            .filter(|obj| options.selects(*obj))
            .cloned()
            .collect();
        // Subscribe under the lock so no write falls between list and watch.
        (selected, self.inner.events.subscribe())
    }
}

#[async_trait]
impl<T: Resource> ResourceClient<T> for MemoryStore<T> {
    async fn get(&self, namespace: &str, name: &str) -> Result<T> {
        let key = encode_key(namespace, name);
        self.inner
            .objects
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(T::gvk().kind, key))
    }

    async fn update(&self, namespace: &str, obj: &T) -> Result<T> {
        let mut objects = self.inner.objects.lock();
        let (key, current) = Self::lookup(&objects, namespace, obj)?;
        self.check_write(&key, &obj.meta().resource_version, &current)?;

        let mut updated = obj.clone();
        *updated.status_mut() = current.status().clone();
        {
            let stored = current.meta();
            let meta = updated.meta_mut();
            meta.uid.clone_from(&stored.uid);
            meta.creation_timestamp = stored.creation_timestamp;
            meta.deletion_timestamp = stored.deletion_timestamp;
            meta.resource_version.clone_from(&stored.resource_version);
            meta.generation = stored.generation;
        }
        let spec_changed = updated.spec() != current.spec();
        if !spec_changed && updated.meta() == current.meta() {
            trace!(key = %key, "update is a no-op");
            return Ok(current);
        }

        if spec_changed {
            updated.meta_mut().generation += 1;
        }
        updated.meta_mut().resource_version = self.next_version();
        self.inner.writes.fetch_add(1, Ordering::SeqCst);

        if updated.meta().is_being_deleted() && updated.meta().finalizers.is_empty() {
            objects.remove(&key);
            let _ = self.inner.events.send(WatchEvent::Deleted(updated.clone()));
            debug!(kind = %T::gvk().kind, key = %key, "last finalizer removed, object deleted");
            return Ok(updated);
        }

        objects.insert(key, updated.clone());
        let _ = self.inner.events.send(WatchEvent::Modified {
            old: current,
            new: updated.clone(),
        });
        Ok(updated)
    }

    async fn update_status(&self, namespace: &str, obj: &T) -> Result<T> {
        let mut objects = self.inner.objects.lock();
        let (key, current) = Self::lookup(&objects, namespace, obj)?;
        self.check_write(&key, &obj.meta().resource_version, &current)?;

        if obj.status() == current.status() {
            trace!(key = %key, "status update is a no-op");
            return Ok(current);
        }

        let mut updated = current.clone();
        *updated.status_mut() = obj.status().clone();
        updated.meta_mut().resource_version = self.next_version();
        self.inner.writes.fetch_add(1, Ordering::SeqCst);

        objects.insert(key, updated.clone());
        let _ = self.inner.events.send(WatchEvent::Modified {
            old: current,
            new: updated.clone(),
        });
        Ok(updated)
    }

    async fn inform(
        &self,
        handler: Arc<dyn EventHandler<T>>,
        options: InformOptions,
        stop: StopSignal,
    ) -> Result<Lister<T>> {
        if stop.is_stopped() {
            return Err(ClientError::cache_sync("stopped before the initial sync"));
        }

        let (initial, rx) = self.snapshot(&options);
        let cache: Cache<T> = Arc::new(RwLock::new(BTreeMap::new()));
        for obj in initial {
            let key = obj.key();
            handler.on_add(&key, &obj);
            cache.write().insert(key, obj);
        }
        debug!(
            kind = %T::gvk().kind,
            cached = cache.read().len(),
            "informer synced"
        );

        let informer = Informer {
            store: self.clone(),
            handler,
            options,
            cache: Arc::clone(&cache),
        };
        tokio::spawn(informer.run(rx, stop));

        Ok(Lister::new(cache))
    }
}

struct Informer<T> {
    store: MemoryStore<T>,
    handler: Arc<dyn EventHandler<T>>,
    options: InformOptions,
    cache: Cache<T>,
}

impl<T: Resource> Informer<T> {
    async fn run(self, mut rx: broadcast::Receiver<WatchEvent<T>>, stop: StopSignal) {
        let period = self.options.resync_period.filter(|p| !p.is_zero());
        let mut resync = period.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                () = stop.stopped() => break,
                () = next_resync(&mut resync) => self.resync(),
                event = rx.recv() => match event {
                    Ok(event) => self.apply(event),
                    Err(RecvError::Lagged(missed)) => {
                        self.handler.on_error(&ClientError::watch(format!(
                            "watch fell behind by {missed} events"
                        )));
                        rx = self.relist();
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!(kind = %T::gvk().kind, "informer stopped");
    }

    fn apply(&self, event: WatchEvent<T>) {
        match event {
            WatchEvent::Added(obj) => self.observe(obj),
            WatchEvent::Modified { new, .. } => self.observe(new),
            WatchEvent::Deleted(obj) => {
                let key = obj.key();
                if self.cache.write().remove(&key).is_some() {
                    self.handler.on_delete(&key, &obj);
                }
            }
        }
    }

    /// Reconcile the cache with the latest state of one object, honoring the
    /// selectors. An object that stops matching is reported as deleted.
    fn observe(&self, obj: T) {
        let key = obj.key();
        let selected = self.options.selects(&obj);
        let previous = if selected {
            self.cache.write().insert(key.clone(), obj.clone())
        } else {
            self.cache.write().remove(&key)
        };

        match (previous, selected) {
            (Some(old), true) => self.handler.on_update(&key, &old, &obj),
            (None, true) => self.handler.on_add(&key, &obj),
            (Some(old), false) => self.handler.on_delete(&key, &old),
            (None, false) => {}
        }
    }

    fn resync(&self) {
        let cached: Vec<(String, T)> = self
            .cache
            .read()
            .iter()
            .map(|(key, obj)| (key.clone(), obj.clone()))
            .collect();
        trace!(kind = %T::gvk().kind, count = cached.len(), "resyncing informer cache");
        for (key, obj) in &cached {
            self.handler.on_update(key, obj, obj);
        }
    }

    fn relist(&self) -> broadcast::Receiver<WatchEvent<T>> {
        warn!(kind = %T::gvk().kind, "relisting after watch error");
        let (latest, rx) = self.store.snapshot(&self.options);
        let latest: BTreeMap<String, T> = latest.into_iter().map(|obj| (obj.key(), obj)).collect();

        let vanished: Vec<(String, T)> = self
            .cache
            .read()
            .iter()
            .filter(|(key, _)| !latest.contains_key(*key))
            .map(|(key, obj)| (key.clone(), obj.clone()))
            .collect();
        for (key, obj) in vanished {
            self.cache.write().remove(&key);
            self.handler.on_delete(&key, &obj);
        }
        for obj in latest.into_values() {
            self.observe(obj);
        }
        rx
    }
}

async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
