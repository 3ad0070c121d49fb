//! Conflict-safe persistence of reconciled zones.
//!
//! Each changed zone is written against a freshly fetched copy of the object:
//! fetch latest, copy the zone over, write, and on conflict start again. Zones
//! the reconciler did not change are never written, so concurrent writers of
//! other zones are not clobbered. Metadata is written before status.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use converge_core::{ObjectMeta, Resource};
use converge_store::{ClientError, ResourceClient};
use tracing::debug;

use crate::backoff::{Backoff, retry_on_conflict};
use crate::diff::MutationDiff;
use crate::error::{Error, Result, Zone};

/// What one `persist` call wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub metadata_written: bool,
    pub status_written: bool,
}

/// Cumulative write counters of a [`Persister`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistCounts {
    pub metadata_writes: u64,
    pub status_writes: u64,
    pub conflicts: u64,
}

/// Writes the metadata and status zones of reconciled objects.
pub struct Persister<T> {
    client: Arc<dyn ResourceClient<T>>,
    backoff: Backoff,
    metadata_writes: AtomicU64,
    status_writes: AtomicU64,
    conflicts: AtomicU64,
}

/// Copy the controller-writable metadata of `local` onto `latest`.
///
/// Labels and annotations merge: local entries win, entries only present on
/// `latest` are kept. Finalizers are replaced as a whole.
pub fn merge_metadata(latest: &mut ObjectMeta, local: &ObjectMeta) {
    latest.finalizers.clone_from(&local.finalizers);
    latest
        .annotations
        .extend(local.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    latest
        .labels
        .extend(local.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
}

impl<T: Resource> Persister<T> {
    pub fn new(client: Arc<dyn ResourceClient<T>>) -> Self {
        Self {
            client,
            backoff: Backoff::default(),
            metadata_writes: AtomicU64::new(0),
            status_writes: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn counts(&self) -> PersistCounts {
        PersistCounts {
            metadata_writes: self.metadata_writes.load(Ordering::Relaxed),
            status_writes: self.status_writes.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    /// Persist the zones of `current` that `diff` reports as changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persist`] naming the zone whose write failed. A failed
    /// metadata write skips the status write.
    pub async fn persist(&self, current: &T, diff: &MutationDiff) -> Result<PersistReport> {
        let mut report = PersistReport::default();

        if diff.metadata_changed() {
            debug!(
                finalizers_changed = diff.finalizers_changed,
                annotations_changed = diff.annotations_changed,
                labels_changed = diff.labels_changed,
                "metadata changed"
            );
            let updated = self
                .write_metadata(current)
                .await
                .map_err(|e| Error::persist(Zone::Metadata, e))?;
            self.metadata_writes.fetch_add(1, Ordering::Relaxed);
            report.metadata_written = true;
            debug!(
                resource_version = %updated.meta().resource_version,
                "updated metadata"
            );
        }

        if diff.status_changed {
            self.write_status(current)
                .await
                .map_err(|e| Error::persist(Zone::Status, e))?;
            self.status_writes.fetch_add(1, Ordering::Relaxed);
            report.status_written = true;
            debug!("updated status");
        }

        Ok(report)
    }

    async fn write_metadata(&self, current: &T) -> std::result::Result<T, ClientError> {
        let client = &self.client;
        let conflicts = &self.conflicts;
        let local = current.meta();
        let (namespace, name) = (local.namespace.as_str(), local.name.as_str());

        retry_on_conflict(&self.backoff, || async move {
            let mut latest = client.get(namespace, name).await?;
            merge_metadata(latest.meta_mut(), local);
            count_conflict(conflicts, client.update(namespace, &latest).await)
        })
        .await
    }

    async fn write_status(&self, current: &T) -> std::result::Result<T, ClientError> {
        let client = &self.client;
        let conflicts = &self.conflicts;
        let (namespace, name) = (
            current.meta().namespace.as_str(),
            current.meta().name.as_str(),
        );

        retry_on_conflict(&self.backoff, || async move {
            let mut latest = client.get(namespace, name).await?;
            latest.status_mut().clone_from(current.status());
            count_conflict(conflicts, client.update_status(namespace, &latest).await)
        })
        .await
    }
}

fn count_conflict<T>(
    conflicts: &AtomicU64,
    result: std::result::Result<T, ClientError>,
) -> std::result::Result<T, ClientError> {
    if result.as_ref().is_err_and(ClientError::is_conflict) {
        conflicts.fetch_add(1, Ordering::Relaxed);
    }
    result
}
