//! Bounded, jittered exponential backoff for optimistic-concurrency retries.

use std::future::Future;
use std::time::Duration;

use converge_store::ClientError;
use tracing::debug;

/// Retry schedule used when a write hits a conflict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Total number of attempts.
    pub steps: u32,
    /// Delay before the second attempt.
    pub duration: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f64,
    /// Each delay is stretched by up to this fraction.
    pub jitter: f64,
}

impl Default for Backoff {
    /// 4 attempts, 10ms initial delay, x5 per step, 10% jitter.
    fn default() -> Self {
        Self {
            steps: 4,
            duration: Duration::from_millis(10),
            factor: 5.0,
            jitter: 0.1,
        }
    }
}

impl Backoff {
    /// A schedule with no delays, for tests.
    pub fn immediate(steps: u32) -> Self {
        Self {
            steps,
            duration: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay slept after the given failed attempt (0-indexed), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        scale(self.duration, self.factor.max(1.0).powi(exponent))
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        scale(base, rand::random::<f64>().mul_add(self.jitter, 1.0))
    }
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or the
/// schedule runs out. Exhaustion returns the last conflict.
pub async fn retry_on_conflict<T, F, Fut>(
    backoff: &Backoff,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let steps = backoff.steps.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_conflict() && attempt + 1 < steps => {
                let delay = backoff.jittered(attempt);
                debug!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "write conflict, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
