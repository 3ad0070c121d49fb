//! The reconciliation loop.
//!
//! A controller owns one work queue fed by an informer on the primary
//! collection and by owner fan-out from subordinate collections. A fixed pool
//! of workers drains the queue. Each key goes through:
//!
//! 1. **Idle**: wait on the queue
//! 2. **Dispatched**: decode the key and fetch the latest object
//! 3. **Reconciling**: snapshot, reconcile, diff, persist
//! 4. **Completing**: route the outcome back to the queue, then `done`

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use converge_core::{GroupVersionKind, Resource, StopSignal, decode_key, stop_channel};
use converge_queue::{
    RateLimiter, RateLimiterConfig, RateLimitingQueue, WorkQueue, default_controller_rate_limiter,
};
use converge_store::{EventHandler, InformOptions, LabelSelector, Lister, ResourceClient};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, error, field, info, info_span};

use crate::backoff::Backoff;
use crate::config::ControllerConfig;
use crate::diff::MutationDiff;
use crate::error::{Error, Result};
use crate::observer::{Phase, ReconcileObserver, TracingObserver};
use crate::outcome::Outcome;
use crate::owned::OwnedType;
use crate::persist::Persister;
use crate::reconciler::Reconciler;
use crate::stats::{ControllerStats, StatsSnapshot};

/// Snapshot strategy used before each reconcile.
pub type DeepCopyFn<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

/// Runtime options for a [`Controller`].
pub struct ControllerOptions<T> {
    /// Namespace to watch. Empty watches all namespaces.
    pub namespace: String,
    /// Number of workers.
    pub concurrency: usize,
    /// Overrides `Clone` for the pre-reconcile snapshot.
    pub deep_copy: Option<DeepCopyFn<T>>,
    /// Injected queue. Built around `rate_limiter` when absent.
    pub queue: Option<Arc<dyn WorkQueue>>,
    pub owned_types: Vec<OwnedType>,
    /// Ordinary failures retried before a key is dropped.
    pub max_retries: u32,
    pub cache_sync_timeout: Duration,
    pub resync_period: Option<Duration>,
    pub label_selector: LabelSelector,
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Conflict-retry schedule of the persister.
    pub backoff: Backoff,
    pub observer: Arc<dyn ReconcileObserver>,
}

impl<T> Default for ControllerOptions<T> {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            concurrency: 1,
            deep_copy: None,
            queue: None,
            owned_types: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            cache_sync_timeout: DEFAULT_CACHE_SYNC_TIMEOUT,
            resync_period: None,
            label_selector: LabelSelector::everything(),
            rate_limiter: Arc::new(default_controller_rate_limiter()),
            backoff: Backoff::default(),
            observer: Arc::new(TracingObserver),
        }
    }
}

impl<T> ControllerOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from validated file configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            namespace: config.namespace.clone(),
            concurrency: config.concurrency,
            max_retries: config.max_retries,
            cache_sync_timeout: config.cache_sync_timeout(),
            resync_period: config.resync_period(),
            label_selector: config.selector()?,
            rate_limiter: Arc::new(
                config
                    .rate_limit
                    .build()
                    .map_err(|e| Error::invalid_config(format!("rate_limit: {e}")))?,
            ),
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_deep_copy(mut self, deep_copy: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        self.deep_copy = Some(Arc::new(deep_copy));
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub fn with_owned_type(mut self, owned: OwnedType) -> Self {
        self.owned_types.push(owned);
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_cache_sync_timeout(mut self, timeout: Duration) -> Self {
        self.cache_sync_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = Some(period).filter(|p| !p.is_zero());
        self
    }

    #[must_use]
    pub fn with_label_selector(mut self, selector: LabelSelector) -> Self {
        self.label_selector = selector;
        self
    }

    /// Replace the default rate limiter with one built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not describe a usable
    /// limiter.
    pub fn with_rate_limiter(mut self, config: &RateLimiterConfig) -> Result<Self> {
        let limiter = config
            .build()
            .map_err(|e| Error::invalid_config(format!("rate_limit: {e}")))?;
        self.rate_limiter = Arc::new(limiter);
        Ok(self)
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ReconcileObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// Primary-collection handler: every notification enqueues the object's key.
struct EnqueueObject {
    queue: Arc<dyn WorkQueue>,
}

impl<T> EventHandler<T> for EnqueueObject {
    fn on_add(&self, key: &str, _obj: &T) {
        self.queue.add(key);
    }

    fn on_update(&self, key: &str, _old: &T, _new: &T) {
        self.queue.add(key);
    }

    fn on_delete(&self, key: &str, _obj: &T) {
        self.queue.add(key);
    }
}

struct Inner<T> {
    name: String,
    client: Arc<dyn ResourceClient<T>>,
    reconciler: Arc<dyn Reconciler<T>>,
    options: ControllerOptions<T>,
    queue: Arc<dyn WorkQueue>,
    persister: Persister<T>,
    stats: ControllerStats,
    lister: RwLock<Option<Lister<T>>>,
    owned_listers: RwLock<HashMap<GroupVersionKind, Box<dyn Any + Send + Sync>>>,
}

/// A level-triggered controller for resources of type `T`.
///
/// Cheap to clone; clones share the same queue and caches.
pub struct Controller<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Controller<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Resource> Controller<T> {
    pub fn new(
        client: Arc<dyn ResourceClient<T>>,
        reconciler: Arc<dyn Reconciler<T>>,
        options: ControllerOptions<T>,
    ) -> Self {
        let name = T::gvk().kind.to_lowercase();
        let queue = options.queue.clone().unwrap_or_else(|| {
            Arc::new(RateLimitingQueue::new(
                name.clone(),
                Arc::clone(&options.rate_limiter),
            ))
        });
        let persister = Persister::new(Arc::clone(&client)).with_backoff(options.backoff);

        Self {
            inner: Arc::new(Inner {
                name,
                client,
                reconciler,
                options,
                queue,
                persister,
                stats: ControllerStats::default(),
                lister: RwLock::new(None),
                owned_listers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The controller's work queue.
    pub fn queue(&self) -> Arc<dyn WorkQueue> {
        Arc::clone(&self.inner.queue)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot(self.inner.persister.counts())
    }

    /// The primary cache, once `run` has synced it.
    pub fn lister(&self) -> Option<Lister<T>> {
        self.inner.lister.read().clone()
    }

    /// The cache of an owned collection, once `run` has synced it.
    pub fn owned_lister<O: Resource>(&self) -> Option<Lister<O>> {
        self.inner
            .owned_listers
            .read()
            .get(&O::gvk())
            .and_then(|lister| lister.downcast_ref::<Lister<O>>())
            .cloned()
    }

    fn inform_options(&self) -> InformOptions {
        let options = &self.inner.options;
        let informed = InformOptions::new()
            .with_namespace(&options.namespace)
            .with_label_selector(options.label_selector.clone());
        match options.resync_period {
            Some(period) => informed.with_resync_period(period),
            None => informed,
        }
    }

    /// Sync caches, start the workers, and block until `stop` fires.
    ///
    /// On stop the queue is shut down, every worker is joined, and the
    /// informers are cancelled before this returns. A stop that arrives while
    /// caches are still syncing returns `Ok(())` without starting workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheSync`] if an informer fails to start or sync
    /// within the configured timeout. No worker is started in that case.
    pub async fn run(&self, stop: StopSignal) -> Result<()> {
        let inner = &self.inner;
        let concurrency = inner.options.concurrency.max(1);
        info!(
            controller = %inner.name,
            namespace = %inner.options.namespace,
            concurrency,
            "starting controller"
        );

        // Informers get their own signal so a failed or abandoned sync can
        // cancel the ones already started.
        let (informers, informer_stop) = stop_channel();
        let synced = tokio::select! {
            () = stop.stopped() => {
                info!(controller = %inner.name, "stopped before caches synced");
                inner.queue.shut_down();
                informers.stop();
                return Ok(());
            }
            synced = self.sync_caches(&informer_stop) => synced,
        };
        if let Err(err) = synced {
            error!(controller = %inner.name, error = %err, "failed to wait for caches to sync");
            inner.queue.shut_down();
            informers.stop();
            return Err(err);
        }
        info!(controller = %inner.name, "caches synced, starting workers");

        let workers: Vec<_> = (0..concurrency)
            .map(|id| tokio::spawn(self.clone().worker(id, stop.clone())))
            .collect();

        stop.stopped().await;
        info!(controller = %inner.name, "stopping controller");
        inner.queue.shut_down();

        for joined in futures::future::join_all(workers).await {
            if let Err(err) = joined {
                error!(controller = %inner.name, error = %err, "worker task failed");
            }
        }
        informers.stop();
        info!(controller = %inner.name, "controller stopped");
        Ok(())
    }

    async fn sync_caches(&self, stop: &StopSignal) -> Result<()> {
        let inner = &self.inner;
        let timeout = inner.options.cache_sync_timeout;
        let kind = T::gvk().kind;

        let handler = Arc::new(EnqueueObject {
            queue: Arc::clone(&inner.queue),
        });
        let lister = tokio::time::timeout(
            timeout,
            inner
                .client
                .inform(handler, self.inform_options(), stop.clone()),
        )
        .await
        .map_err(|_| Error::cache_sync(&kind, format!("timed out after {timeout:?}")))?
        .map_err(|e| Error::cache_sync(&kind, e.to_string()))?;
        *inner.lister.write() = Some(lister);

        let owned_options = InformOptions::new().with_namespace(&inner.options.namespace);
        for owned in &inner.options.owned_types {
            let gvk = owned.gvk();
            let lister = tokio::time::timeout(
                timeout,
                owned.start(
                    Arc::clone(&inner.queue),
                    owned_options.clone(),
                    stop.clone(),
                ),
            )
            .await
            .map_err(|_| Error::cache_sync(&gvk.kind, format!("timed out after {timeout:?}")))?
            .map_err(|e| Error::cache_sync(&gvk.kind, e.to_string()))?;
            debug!(controller = %inner.name, owned = %gvk, "owned cache synced");
            inner.owned_listers.write().insert(gvk, lister);
        }
        Ok(())
    }

    async fn worker(self, id: usize, stop: StopSignal) {
        let inner = &self.inner;
        debug!(controller = %inner.name, worker = id, "worker started");

        loop {
            inner.options.observer.on_phase(id, None, Phase::Idle);
            let Some(key) = inner.queue.get().await else {
                break;
            };

            let span = info_span!(
                "reconcile",
                controller = %inner.name,
                key = %key,
                namespace = field::Empty,
                name = field::Empty,
            );
            self.process_key(id, &key).instrument(span).await;

            if stop.is_stopped() {
                break;
            }
        }
        debug!(controller = %inner.name, worker = id, "worker stopped");
    }

    async fn process_key(&self, worker: usize, key: &str) {
        let inner = &self.inner;
        let observer = &inner.options.observer;
        observer.on_phase(worker, Some(key), Phase::Dispatched);
        inner.stats.record_processed();

        let started = Instant::now();
        let result = self.process_item(worker, key).await;
        debug!(
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ok = result.is_ok(),
            "reconcile finished"
        );

        observer.on_phase(worker, Some(key), Phase::Completing);
        self.handle_result(key, &result);
        inner.queue.done(key);
    }

    /// Fetch, reconcile, and persist one key.
    async fn process_item(&self, worker: usize, key: &str) -> anyhow::Result<()> {
        let inner = &self.inner;
        let object_key = decode_key(key)?;
        let span = Span::current();
        span.record("namespace", object_key.namespace.as_str());
        span.record("name", object_key.name.as_str());

        let mut current = inner
            .client
            .get(&object_key.namespace, &object_key.name)
            .await?;
        let snapshot = match &inner.options.deep_copy {
            Some(deep_copy) => deep_copy(&current),
            None => current.clone(),
        };

        inner
            .options
            .observer
            .on_phase(worker, Some(key), Phase::Reconciling);
        inner.reconciler.reconcile(&mut current).await?;

        let diff = MutationDiff::compute(&snapshot, &current);
        if diff.spec_changed {
            inner.stats.record_spec_change_ignored();
            inner.options.observer.on_spec_change_ignored(key);
        }

        inner.persister.persist(&current, &diff).await?;
        Ok(())
    }

    /// Route a finished cycle back to the queue.
    fn handle_result(&self, key: &str, result: &anyhow::Result<()>) {
        let inner = &self.inner;
        let observer = &inner.options.observer;
        let outcome = Outcome::classify(result);
        inner.stats.record_outcome(outcome);
        observer.on_outcome(key, outcome, result.as_ref().err());

        match outcome {
            Outcome::Success | Outcome::Permanent => inner.queue.forget(key),
            Outcome::RequeueAfter(delay) => inner.queue.add_after(key, delay),
            Outcome::RequeueImmediately => inner.queue.add_rate_limited(key),
            Outcome::Failed => {
                let Err(err) = result else { return };
                let attempts = inner.queue.num_requeues(key);
                if attempts < inner.options.max_retries {
                    inner.stats.record_retry();
                    observer.on_retry(key, attempts + 1, err);
                    inner.queue.add_rate_limited(key);
                } else {
                    inner.stats.record_drop();
                    observer.on_dropped(key, attempts, err);
                    inner.queue.forget(key);
                }
            }
        }
    }
}
