//! Reconciliation outcomes.
//!
//! A reconciler reports how its key should be routed by returning one of the
//! sentinel errors built here. Sentinels stay recognizable through any amount
//! of wrapping (`anyhow` context, custom error types with a `source`).

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Requeue the key once `delay` has elapsed. Does not count as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueAfter {
    delay: Duration,
}

impl RequeueAfter {
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl fmt::Display for RequeueAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requeue after {:?}", self.delay)
    }
}

impl StdError for RequeueAfter {}

/// Requeue the key through the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueImmediately;

impl fmt::Display for RequeueImmediately {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requeue immediately")
    }
}

impl StdError for RequeueImmediately {}

/// A failure that retrying cannot fix.
#[derive(Debug)]
pub struct PermanentError {
    cause: anyhow::Error,
}

impl PermanentError {
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

impl fmt::Display for PermanentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permanent error: {}", self.cause)
    }
}

impl StdError for PermanentError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Ask for the key to be processed again after `delay`.
pub fn requeue_after(delay: Duration) -> anyhow::Error {
    anyhow::Error::new(RequeueAfter { delay })
}

/// Ask for the key to be processed again as soon as the rate limiter allows.
pub fn requeue_immediately() -> anyhow::Error {
    anyhow::Error::new(RequeueImmediately)
}

/// Mark `cause` as not worth retrying.
pub fn permanent(cause: impl Into<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(PermanentError {
        cause: cause.into(),
    })
}

/// Like [`permanent`], but passes "no error" through as `None`.
pub fn permanent_opt<E: Into<anyhow::Error>>(cause: Option<E>) -> Option<anyhow::Error> {
    cause.map(permanent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sentinel {
    Permanent,
    After(Duration),
    Immediately,
}

/// The outermost sentinel in the error chain.
fn sentinel(err: &anyhow::Error) -> Option<Sentinel> {
    err.chain().find_map(|e| {
        if e.is::<PermanentError>() {
            Some(Sentinel::Permanent)
        } else if let Some(after) = e.downcast_ref::<RequeueAfter>() {
            Some(Sentinel::After(after.delay))
        } else if e.is::<RequeueImmediately>() {
            Some(Sentinel::Immediately)
        } else {
            None
        }
    })
}

/// Whether `err` is, or wraps, a [`PermanentError`].
pub fn is_permanent_error<'a>(err: impl Into<Option<&'a anyhow::Error>>) -> bool {
    err.into().and_then(sentinel) == Some(Sentinel::Permanent)
}

/// Whether `err` is, or wraps, a delayed or immediate requeue request.
pub fn is_requeue_error<'a>(err: impl Into<Option<&'a anyhow::Error>>) -> bool {
    matches!(
        err.into().and_then(sentinel),
        Some(Sentinel::After(_) | Sentinel::Immediately)
    )
}

/// The requested delay of a [`RequeueAfter`], or zero for anything else.
pub fn requeue_duration<'a>(err: impl Into<Option<&'a anyhow::Error>>) -> Duration {
    match err.into().and_then(sentinel) {
        Some(Sentinel::After(delay)) => delay,
        _ => Duration::ZERO,
    }
}

/// How a reconciliation cycle ended, and therefore how its key is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    RequeueAfter(Duration),
    RequeueImmediately,
    Permanent,
    /// An ordinary error: retried through the rate limiter up to the ceiling.
    Failed,
}

impl Outcome {
    /// Classify a cycle result. Permanent failures win over requeue requests.
    pub fn classify(result: &anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(err) => match sentinel(err) {
                Some(Sentinel::Permanent) => Self::Permanent,
                Some(Sentinel::After(delay)) => Self::RequeueAfter(delay),
                Some(Sentinel::Immediately) => Self::RequeueImmediately,
                None => Self::Failed,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RequeueAfter(_) => "requeue_after",
            Self::RequeueImmediately => "requeue_immediately",
            Self::Permanent => "permanent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
