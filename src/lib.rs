#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # Converge
//!
//! Level-triggered reconciliation controllers for typed resources.
//!
//! This library re-exports the workspace crates for convenience.

pub use converge_core;
pub use converge_queue;
pub use converge_reconciler;
pub use converge_store;

/// The types most controllers need.
pub mod prelude {
    pub use converge_core::{
        GroupVersionKind, ObjectKey, ObjectMeta, OwnerReference, Resource, StopHandle,
        StopSignal, decode_key, encode_key, set_owner_reference, stop_channel,
    };
    pub use converge_queue::{RateLimiterConfig, RateLimitingQueue, WorkQueue};
    pub use converge_reconciler::{
        Controller, ControllerConfig, ControllerOptions, OwnedType, Reconciler,
        ReconcileObserver, TracingObserver, is_permanent_error, is_requeue_error, permanent,
        permanent_opt, reconciler_fn, requeue_after, requeue_duration, requeue_immediately,
    };
    pub use converge_store::{
        ClientError, EventHandler, InformOptions, LabelSelector, Lister, MemoryStore,
        ResourceClient,
    };
}
