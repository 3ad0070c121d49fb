//! The deduplicating work queue.
//!
//! A key is in at most one of three places: queued (waiting for a worker),
//! processing (handed out by `get` and not yet `done`), or neither. A key
//! added while processing is marked dirty and re-queued on `done`, so one key
//! is never delivered to two workers at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::rate_limit::{RateLimiter, default_controller_rate_limiter};

/// A rate-limited, delay-capable, deduplicating queue of string keys.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue `key` unless it is already queued.
    fn add(&self, key: &str);

    /// Enqueue `key` once `delay` has elapsed. A zero delay adds immediately.
    fn add_after(&self, key: &str, delay: Duration);

    /// Enqueue `key` after the delay chosen by the rate limiter.
    fn add_rate_limited(&self, key: &str);

    /// Wait for the next key. Returns `None` once the queue is shut down and
    /// drained.
    async fn get(&self) -> Option<String>;

    /// Mark a key returned by `get` as finished.
    fn done(&self, key: &str);

    /// Clear the rate limiter's history for `key`.
    fn forget(&self, key: &str);

    /// Number of rate-limited requeues recorded for `key`.
    fn num_requeues(&self, key: &str) -> u32;

    /// Number of keys waiting to be handed out.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake every waiting `get`.
    fn shut_down(&self);

    fn is_shutting_down(&self) -> bool;
}

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    waiting: HashMap<String, Instant>,
    shutting_down: bool,
}

struct Shared {
    name: String,
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn add(&self, key: &str) {
        {
            let mut state = self.state.lock();
            if state.shutting_down || !state.dirty.insert(key.to_string()) {
                return;
            }
            if state.processing.contains(key) {
                trace!(queue = %self.name, key, "key is processing, marked dirty");
                return;
            }
            state.queue.push_back(key.to_string());
        }
        self.notify.notify_one();
    }

    fn fire_waiting(&self, key: &str, ready_at: Instant) {
        let due = {
            let mut state = self.state.lock();
            if state.waiting.get(key) == Some(&ready_at) {
                state.waiting.remove(key);
                true
            } else {
                false
            }
        };
        if due {
            self.add(key);
        }
    }
}

/// The default [`WorkQueue`] implementation.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct RateLimitingQueue {
    shared: Arc<Shared>,
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitingQueue {
    /// Create a queue with the given rate limiter.
    pub fn new(name: impl Into<String>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
            limiter,
        }
    }

    /// Create a queue with the default controller rate limiter.
    pub fn with_default_rate_limiter(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(default_controller_rate_limiter()))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of keys currently handed out to workers.
    pub fn processing_len(&self) -> usize {
        self.shared.state.lock().processing.len()
    }

    fn schedule(&self, key: &str, ready_at: Instant) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(queue = %self.shared.name, key, "no runtime for delayed add, adding now");
                self.shared.state.lock().waiting.remove(key);
                self.shared.add(key);
                return;
            }
        };

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let key = key.to_string();
        handle.spawn(async move {
            tokio::time::sleep_until(ready_at).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire_waiting(&key, ready_at);
            }
        });
    }
}

#[async_trait]
impl WorkQueue for RateLimitingQueue {
    fn add(&self, key: &str) {
        self.shared.add(key);
    }

    fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.shared.add(key);
            return;
        }

        let ready_at = Instant::now() + delay;
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                return;
            }
            match state.waiting.get(key) {
                // An earlier wake-up already covers this request.
                Some(existing) if *existing <= ready_at => return,
                _ => {
                    state.waiting.insert(key.to_string(), ready_at);
                }
            }
        }
        trace!(queue = %self.shared.name, key, ?delay, "scheduled delayed add");
        self.schedule(key, ready_at);
    }

    fn add_rate_limited(&self, key: &str) {
        let delay = self.limiter.when(key);
        self.add_after(key, delay);
    }

    async fn get(&self) -> Option<String> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so an add in between is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    fn done(&self, key: &str) {
        let requeued = {
            let mut state = self.shared.state.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };
        if requeued {
            self.shared.notify.notify_one();
        }
    }

    fn forget(&self, key: &str) {
        self.limiter.forget(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
        self.limiter.num_requeues(key)
    }

    fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    fn shut_down(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            state.waiting.clear();
        }
        debug!(queue = %self.shared.name, "work queue shutting down");
        self.shared.notify.notify_waiters();
    }

    fn is_shutting_down(&self) -> bool {
        self.shared.state.lock().shutting_down
    }
}

impl std::fmt::Debug for RateLimitingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RateLimitingQueue")
            .field("name", &self.shared.name)
            .field("queued", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("waiting", &state.waiting.len())
            .field("shutting_down", &state.shutting_down)
            .finish()
    }
}
