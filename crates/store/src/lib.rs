//! # Resource Store
//!
//! The boundary between a controller and the store that holds its resources:
//!
//! - [`ResourceClient`]: typed get/update/update-status plus informers
//! - [`EventHandler`]: add/update/delete callbacks fed by an informer
//! - [`Lister`]: reads against an informer's synced cache
//! - [`MemoryStore`]: an in-memory implementation with optimistic concurrency

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod client;
pub mod error;
pub mod lister;
pub mod memory;
pub mod selector;

pub use client::{EventHandler, InformOptions, ResourceClient};
pub use error::{ClientError, Result};
pub use lister::{Lister, NamespaceLister};
pub use memory::{MemoryStore, WatchEvent};
pub use selector::{FieldSelector, LabelSelector};
