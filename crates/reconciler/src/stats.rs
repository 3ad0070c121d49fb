//! Controller counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::outcome::Outcome;
use crate::persist::PersistCounts;

/// Point-in-time copy of a controller's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Keys taken from the queue.
    pub processed: u64,
    pub succeeded: u64,
    pub requeued_after: u64,
    pub requeued_immediately: u64,
    /// Ordinary failures sent back through the rate limiter.
    pub retried: u64,
    /// Keys dropped at the retry ceiling.
    pub dropped: u64,
    pub permanent_failures: u64,
    pub spec_changes_ignored: u64,
    pub metadata_writes: u64,
    pub status_writes: u64,
    /// Write conflicts seen by the persister, including retried ones.
    pub conflicts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ControllerStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    requeued_after: AtomicU64,
    requeued_immediately: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    permanent_failures: AtomicU64,
    spec_changes_ignored: AtomicU64,
}

impl ControllerStats {
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_spec_change_ignored(&self) {
        self.spec_changes_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a routed outcome. Ordinary failures are counted by
    /// `record_retry` or `record_drop` instead.
    pub(crate) fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.succeeded,
            Outcome::RequeueAfter(_) => &self.requeued_after,
            Outcome::RequeueImmediately => &self.requeued_immediately,
            Outcome::Permanent => &self.permanent_failures,
            Outcome::Failed => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, persist: PersistCounts) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            requeued_after: self.requeued_after.load(Ordering::Relaxed),
            requeued_immediately: self.requeued_immediately.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            spec_changes_ignored: self.spec_changes_ignored.load(Ordering::Relaxed),
            metadata_writes: persist.metadata_writes,
            status_writes: persist.status_writes,
            conflicts: persist.conflicts,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_outcomes_map_to_counters() {
        let stats = ControllerStats::default();
        stats.record_outcome(Outcome::Success);
        stats.record_outcome(Outcome::RequeueAfter(Duration::from_secs(1)));
        stats.record_outcome(Outcome::Permanent);
        stats.record_outcome(Outcome::Failed);
        stats.record_drop();

        let snapshot = stats.snapshot(PersistCounts {
            conflicts: 2,
            ..PersistCounts::default()
        });
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.requeued_after, 1);
        assert_eq!(snapshot.permanent_failures, 1);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.retried, 0);
        assert_eq!(snapshot.conflicts, 2);
    }
}
