//! Observation hooks for the reconciliation state machine.

use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::outcome::Outcome;

/// Worker state-machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting on the queue.
    Idle,
    /// A key was taken from the queue and is being fetched.
    Dispatched,
    /// The reconciler is running.
    Reconciling,
    /// The result is being routed back to the queue.
    Completing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatched => "dispatched",
            Self::Reconciling => "reconciling",
            Self::Completing => "completing",
        }
    }
}

/// Receives an event for every worker transition and routing decision.
///
/// Every method has a no-op default so observers implement only what they use.
pub trait ReconcileObserver: Send + Sync {
    fn on_phase(&self, _worker: usize, _key: Option<&str>, _phase: Phase) {}

    fn on_outcome(&self, _key: &str, _outcome: Outcome, _error: Option<&anyhow::Error>) {}

    fn on_spec_change_ignored(&self, _key: &str) {}

    /// An ordinary failure is being retried; `attempt` counts from 1.
    fn on_retry(&self, _key: &str, _attempt: u32, _error: &anyhow::Error) {}

    /// A key hit the retry ceiling and was dropped.
    fn on_dropped(&self, _key: &str, _attempts: u32, _error: &anyhow::Error) {}
}

/// Default observer: emits every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ReconcileObserver for TracingObserver {
    fn on_phase(&self, worker: usize, key: Option<&str>, phase: Phase) {
        trace!(worker, key, phase = phase.as_str(), "worker transition");
    }

    fn on_outcome(&self, key: &str, outcome: Outcome, error: Option<&anyhow::Error>) {
        match (outcome, error) {
            (Outcome::Permanent, Some(error)) => {
                error!(key, error = %format!("{error:#}"), "permanent error, not retrying");
            }
            (Outcome::RequeueAfter(delay), _) => {
                debug!(key, delay_ms = millis(delay), "requeueing after delay");
            }
            (Outcome::RequeueImmediately, _) => debug!(key, "requeueing immediately"),
            (Outcome::Success, _) => debug!(key, "reconciled"),
            _ => {}
        }
    }

    fn on_spec_change_ignored(&self, key: &str) {
        warn!(key, "spec changes ignored in reconcile");
    }

    fn on_retry(&self, key: &str, attempt: u32, error: &anyhow::Error) {
        error!(key, attempt, error = %format!("{error:#}"), "error processing item, requeueing");
    }

    fn on_dropped(&self, key: &str, attempts: u32, error: &anyhow::Error) {
        error!(key, attempts, error = %format!("{error:#}"), "max retries exceeded, dropping item");
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
