//! # Work Queue
//!
//! Deduplicating, delay-capable, rate-limited queue of resource keys.
//!
//! Guarantees:
//! - a key is queued at most once, however often it is added
//! - a key is never handed to two workers at the same time
//! - a key added while it is being processed is delivered again after `done`

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod error;
pub mod queue;
pub mod rate_limit;

pub use error::{Error, Result};
pub use queue::{RateLimitingQueue, WorkQueue};
pub use rate_limit::{
    BucketRateLimiter, ExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    MAX_BUCKET_DELAY, RateLimiterConfig, default_controller_rate_limiter,
};

#[cfg(test)]
mod queue_test;
