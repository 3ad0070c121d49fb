//! Core types for converge controllers.
//!
//! This crate holds everything a controller needs to name and describe a
//! resource without talking to a store:
//!
//! - **Keys**: the `namespace/name` codec used by queues and caches
//! - **Metadata**: [`ObjectMeta`] and [`OwnerReference`]
//! - **Resources**: the [`Resource`] capability trait (spec, status, metadata)
//! - **Ownership**: helpers that keep at most one controller reference
//! - **Stop signals**: cooperative cancellation shared by every task

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod gvk;
pub mod key;
pub mod meta;
pub mod owner;
pub mod resource;
pub mod result;
pub mod signal;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use error::Error;
pub use gvk::GroupVersionKind;
pub use key::{ObjectKey, decode_key, encode_key};
pub use meta::{ObjectMeta, OwnerReference};
pub use owner::{
    get_controller_reference, is_owned_by, owner_keys, owner_reference_for,
    remove_owner_reference, set_owner_reference,
};
pub use resource::Resource;
pub use result::Result;
pub use signal::{StopHandle, StopSignal, stop_channel};
