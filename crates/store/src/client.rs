//! The typed resource client contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use converge_core::{Resource, StopSignal};
use tracing::warn;

use crate::error::{ClientError, Result};
use crate::lister::Lister;
use crate::selector::{FieldSelector, LabelSelector};

/// Receives change notifications from an informer.
///
/// Callbacks run on the informer task and must not block.
pub trait EventHandler<T>: Send + Sync {
    fn on_add(&self, key: &str, obj: &T);

    fn on_update(&self, key: &str, old: &T, new: &T);

    fn on_delete(&self, key: &str, obj: &T);

    /// Called when the watch breaks. The informer relists afterwards.
    fn on_error(&self, error: &ClientError) {
        warn!(error = %error, "informer watch error");
    }
}

/// Scoping and resync options for [`ResourceClient::inform`].
#[derive(Debug, Clone, Default)]
pub struct InformOptions {
    pub label_selector: LabelSelector,
    pub field_selector: FieldSelector,
    /// Re-deliver every cached object as an update at this interval.
    pub resync_period: Option<Duration>,
}

impl InformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only observe objects in `namespace`. An empty namespace observes all.
    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        if !namespace.is_empty() {
            self.field_selector = FieldSelector::namespace(namespace);
        }
        self
    }

    #[must_use]
    pub fn with_label_selector(mut self, selector: LabelSelector) -> Self {
        self.label_selector = selector;
        self
    }

    #[must_use]
    pub fn with_field_selector(mut self, selector: FieldSelector) -> Self {
        self.field_selector = selector;
        self
    }

    #[must_use]
    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = Some(period).filter(|p| !p.is_zero());
        self
    }

    /// Whether `obj` passes both selectors.
    pub fn selects<T: Resource>(&self, obj: &T) -> bool {
        let meta = obj.meta();
        self.label_selector.matches(&meta.labels) && self.field_selector.matches(meta)
    }
}

/// Typed access to one resource collection.
#[async_trait]
pub trait ResourceClient<T: Resource>: Send + Sync {
    /// Fetch the latest stored object.
    async fn get(&self, namespace: &str, name: &str) -> Result<T>;

    /// Write spec and metadata. The stored status is kept.
    ///
    /// Fails with [`ClientError::Conflict`] when `obj`'s resource version is
    /// stale.
    async fn update(&self, namespace: &str, obj: &T) -> Result<T>;

    /// Write status only. Spec and metadata in `obj` are ignored.
    async fn update_status(&self, namespace: &str, obj: &T) -> Result<T>;

    /// Start an informer feeding `handler` until `stop` fires.
    ///
    /// Returns once the initial list has been delivered to `handler`; the
    /// returned lister then reads the informer's cache.
    async fn inform(
        &self,
        handler: Arc<dyn EventHandler<T>>,
        options: InformOptions,
        stop: StopSignal,
    ) -> Result<Lister<T>>;
}
