//! Per-key and overall rate limiters consulted by `add_rate_limited`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Longest wait the bucket limiter ever asks for.
pub const MAX_BUCKET_DELAY: Duration = Duration::from_secs(1000);

/// Decides how long a key must wait before it is re-added.
pub trait RateLimiter: Send + Sync {
    /// Delay before `key` may be processed again. Records a failure.
    fn when(&self, key: &str) -> Duration;

    /// Stop tracking `key`; its failure history is cleared.
    fn forget(&self, key: &str);

    /// Number of failures recorded for `key` since it was last forgotten.
    fn num_requeues(&self, key: &str) -> u32;
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
pub struct ExponentialFailureRateLimiter {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ExponentialFailureRateLimiter {
    /// Create a limiter with the given base and maximum delay.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for ExponentialFailureRateLimiter {
    fn when(&self, key: &str) -> Duration {
        let exponent = {
            let mut failures = self.failures.lock();
            let count = failures.entry(key.to_string()).or_insert(0);
            let exponent = *count;
            *count = count.saturating_add(1);
            exponent
        };

        // Overflow in either step means the delay is already past any sane cap.
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(&self, key: &str) {
        self.failures.lock().remove(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket shared by every key.
///
/// Each call reserves one token; when the bucket is empty the returned delay
/// is the time until the reserved token would be refilled.
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    /// Create a bucket refilling at `qps` tokens per second, holding `burst`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRateLimit`] if `qps` is not a positive finite
    /// number or `burst` is zero.
    pub fn new(qps: f64, burst: u32) -> Result<Self> {
        if !qps.is_finite() || qps <= 0.0 {
            return Err(Error::invalid_rate_limit(format!(
                "qps must be positive, got {qps}"
            )));
        }
        if burst == 0 {
            return Err(Error::invalid_rate_limit("burst must be at least 1"));
        }
        Ok(Self::from_parts(qps, burst))
    }

    fn from_parts(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for BucketRateLimiter {
    fn when(&self, _key: &str) -> Duration {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = elapsed.mul_add(self.qps, bucket.tokens).min(self.burst);
        bucket.last = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-bucket.tokens / self.qps)
                .map_or(MAX_BUCKET_DELAY, |wait| wait.min(MAX_BUCKET_DELAY))
        }
    }

    fn forget(&self, _key: &str) {}

    fn num_requeues(&self, _key: &str) -> u32 {
        0
    }
}

/// Combines limiters by taking the longest delay of any of them.
pub struct MaxOfRateLimiter {
    limiters: Vec<Arc<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {
    /// Combine the given limiters.
    pub fn new(limiters: Vec<Arc<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfRateLimiter {
    fn when(&self, key: &str) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, key: &str) {
        self.limiters.iter().for_each(|limiter| limiter.forget(key));
    }

    fn num_requeues(&self, key: &str) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Tunables for the default controller rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Per-key base delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-key maximum delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Overall refill rate in items per second.
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// Overall bucket size.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

const fn default_base_delay_ms() -> u64 {
    5
}

const fn default_max_delay_ms() -> u64 {
    1_000_000
}

const fn default_qps() -> f64 {
    10.0
}

const fn default_burst() -> u32 {
    100
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

impl RateLimiterConfig {
    /// Check that the settings describe a usable limiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRateLimit`] for a non-positive or non-finite
    /// `qps`, a zero `burst`, or a base delay above the maximum delay.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::invalid_rate_limit(
                "base_delay_ms must not exceed max_delay_ms",
            ));
        }
        BucketRateLimiter::new(self.qps, self.burst).map(drop)
    }

    /// Build the max-of per-key exponential and overall bucket limiters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRateLimit`] if the settings fail [`Self::validate`].
    pub fn build(&self) -> Result<MaxOfRateLimiter> {
        self.validate()?;
        Ok(self.build_unchecked())
    }

    fn build_unchecked(&self) -> MaxOfRateLimiter {
        MaxOfRateLimiter::new(vec![
            Arc::new(ExponentialFailureRateLimiter::new(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )),
            Arc::new(BucketRateLimiter::from_parts(self.qps, self.burst)),
        ])
    }
}

/// The default controller limiter: 5ms..1000s per key, 10 qps / 100 burst overall.
pub fn default_controller_rate_limiter() -> MaxOfRateLimiter {
    RateLimiterConfig::default().build_unchecked()
}
