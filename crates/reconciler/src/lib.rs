//! Level-triggered reconciliation for typed resources.
//!
//! A [`Controller`] watches one resource collection and drives every object
//! toward the state its [`Reconciler`] computes:
//!
//! - **Queue**: notifications only enqueue keys, so bursts coalesce
//! - **Reconcile**: the reconciler mutates the latest stored object in place
//! - **Diff**: only changed metadata and status zones are written
//! - **Persist**: each zone is written against a fresh read, retried on conflict
//! - **Route**: the returned error decides requeue, retry, or drop
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use converge_reconciler::{Controller, ControllerOptions, reconciler_fn};
//!
//! let reconciler = reconciler_fn(|widget: &mut Widget| {
//!     Box::pin(async move {
//!         widget.status.ready = widget.spec.replicas;
//!         anyhow::Ok(())
//!     })
//! });
//! let controller = Controller::new(client, Arc::new(reconciler), ControllerOptions::new());
//! controller.run(stop).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod backoff;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod observer;
pub mod outcome;
pub mod owned;
pub mod persist;
pub mod reconciler;
pub mod stats;

pub use backoff::{Backoff, retry_on_conflict};
pub use config::ControllerConfig;
pub use controller::{Controller, ControllerOptions, DeepCopyFn};
pub use diff::MutationDiff;
pub use error::{Error, Result, Zone};
pub use observer::{Phase, ReconcileObserver, TracingObserver};
pub use outcome::{
    Outcome, PermanentError, RequeueAfter, RequeueImmediately, is_permanent_error,
    is_requeue_error, permanent, permanent_opt, requeue_after, requeue_duration,
    requeue_immediately,
};
pub use owned::{OwnedType, enqueue_request_for_owner, watch_owned};
pub use persist::{PersistCounts, PersistReport, Persister, merge_metadata};
pub use reconciler::{Reconciler, ReconcilerFn, reconciler_fn};
pub use stats::StatsSnapshot;
