//! Owner fan-out: changes to subordinate objects enqueue their owners.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use converge_core::{GroupVersionKind, ObjectMeta, Resource, StopSignal, owner_keys};
use converge_queue::WorkQueue;
use converge_store::{EventHandler, InformOptions, Lister, ResourceClient};
use itertools::Itertools;
use tracing::{debug, trace};

use crate::error::Result;

/// Map a subordinate's metadata to the keys of its owners of kind
/// `owner_kind`. With `controller_only`, only the controlling owner counts.
pub fn enqueue_request_for_owner(
    owner_kind: GroupVersionKind,
    controller_only: bool,
) -> impl Fn(&ObjectMeta) -> Vec<String> + Clone + Send + Sync + 'static {
    move |meta: &ObjectMeta| owner_keys(meta, &owner_kind, controller_only)
}

/// Informer handler that adds owner keys to a queue.
struct OwnerEnqueuer<O, F> {
    map: F,
    queue: Arc<dyn WorkQueue>,
    _owned: PhantomData<fn(&O)>,
}

impl<O, F> OwnerEnqueuer<O, F>
where
    O: Resource,
    F: Fn(&ObjectMeta) -> Vec<String> + Send + Sync,
{
    fn enqueue<'a>(&self, objects: impl IntoIterator<Item = &'a O>) {
        for key in objects
            .into_iter()
            .flat_map(|obj| (self.map)(obj.meta()))
            .unique()
        {
            trace!(owner = %key, kind = %O::gvk().kind, "enqueueing owner");
            self.queue.add(&key);
        }
    }
}

impl<O, F> EventHandler<O> for OwnerEnqueuer<O, F>
where
    O: Resource,
    F: Fn(&ObjectMeta) -> Vec<String> + Send + Sync,
{
    fn on_add(&self, _key: &str, obj: &O) {
        self.enqueue([obj]);
    }

    fn on_update(&self, _key: &str, old: &O, new: &O) {
        // Owners of both states: a reference may have been added or removed.
        self.enqueue([old, new]);
    }

    fn on_delete(&self, _key: &str, obj: &O) {
        self.enqueue([obj]);
    }
}

/// Watch a subordinate collection and enqueue the owners of every changed
/// object. Returns once the subordinate cache has synced.
///
/// # Errors
///
/// Returns the client error if the informer fails to start.
pub async fn watch_owned<O: Resource>(
    client: &dyn ResourceClient<O>,
    queue: Arc<dyn WorkQueue>,
    owner_kind: GroupVersionKind,
    controller_only: bool,
    options: InformOptions,
    stop: StopSignal,
) -> Result<Lister<O>> {
    debug!(
        owned = %O::gvk(),
        owner = %owner_kind,
        controller_only,
        "watching owned resources"
    );
    let handler = Arc::new(OwnerEnqueuer::<O, _> {
        map: enqueue_request_for_owner(owner_kind, controller_only),
        queue,
        _owned: PhantomData,
    });
    Ok(client.inform(handler, options, stop).await?)
}

/// Type-erased subordinate binding started by the controller.
#[async_trait]
trait OwnedWatch: Send + Sync {
    fn gvk(&self) -> GroupVersionKind;

    async fn start(
        &self,
        queue: Arc<dyn WorkQueue>,
        options: InformOptions,
        stop: StopSignal,
    ) -> Result<Box<dyn Any + Send + Sync>>;
}

struct OwnedBinding<O> {
    client: Arc<dyn ResourceClient<O>>,
    owner_kind: GroupVersionKind,
    controller_only: bool,
}

#[async_trait]
impl<O: Resource> OwnedWatch for OwnedBinding<O> {
    fn gvk(&self) -> GroupVersionKind {
        O::gvk()
    }

    async fn start(
        &self,
        queue: Arc<dyn WorkQueue>,
        options: InformOptions,
        stop: StopSignal,
    ) -> Result<Box<dyn Any + Send + Sync>> {
        let lister = watch_owned(
            self.client.as_ref(),
            queue,
            self.owner_kind.clone(),
            self.controller_only,
            options,
            stop,
        )
        .await?;
        Ok(Box::new(lister))
    }
}

/// A subordinate resource type whose changes re-trigger its owners.
#[derive(Clone)]
pub struct OwnedType {
    watch: Arc<dyn OwnedWatch>,
}

impl OwnedType {
    /// Bind a subordinate collection to the owning kind `owner_kind`.
    pub fn new<O: Resource>(
        client: Arc<dyn ResourceClient<O>>,
        owner_kind: GroupVersionKind,
        controller_only: bool,
    ) -> Self {
        Self {
            watch: Arc::new(OwnedBinding {
                client,
                owner_kind,
                controller_only,
            }),
        }
    }

    /// Type identity of the subordinate collection.
    pub fn gvk(&self) -> GroupVersionKind {
        self.watch.gvk()
    }

    pub(crate) async fn start(
        &self,
        queue: Arc<dyn WorkQueue>,
        options: InformOptions,
        stop: StopSignal,
    ) -> Result<Box<dyn Any + Send + Sync>> {
        self.watch.start(queue, options, stop).await
    }
}

impl std::fmt::Debug for OwnedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedType").field("gvk", &self.gvk()).finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use converge_core::fixtures::{Gadget, Widget};
    use converge_core::{set_owner_reference, stop_channel};
    use converge_queue::RateLimitingQueue;
    use converge_store::MemoryStore;

    use super::*;

    fn owner(name: &str, uid: &str) -> Widget {
        let mut widget = Widget::new("default", name);
        widget.metadata.uid = uid.to_string();
        widget
    }

    #[test]
    fn test_mapping_respects_controller_flag() {
        let mut gadget = Gadget::new("default", "g1");
        set_owner_reference(&mut gadget.metadata, &owner("w1", "u1"), true).unwrap();
        set_owner_reference(&mut gadget.metadata, &owner("w2", "u2"), false).unwrap();

        let all = enqueue_request_for_owner(Widget::gvk(), false);
        let controller = enqueue_request_for_owner(Widget::gvk(), true);

        assert_eq!(all(&gadget.metadata), vec!["default/w1", "default/w2"]);
        assert_eq!(controller(&gadget.metadata), vec!["default/w1"]);
    }

    #[test]
    fn test_update_enqueues_old_and_new_owners_once() {
        let queue = Arc::new(RateLimitingQueue::with_default_rate_limiter("owners"));
        let handler = OwnerEnqueuer::<Gadget, _> {
            map: enqueue_request_for_owner(Widget::gvk(), false),
            queue: queue.clone(),
            _owned: PhantomData,
        };

        let mut old = Gadget::new("default", "g1");
        set_owner_reference(&mut old.metadata, &owner("w1", "u1"), true).unwrap();
        let mut new = old.clone();
        new.metadata.owner_references.clear();
        set_owner_reference(&mut new.metadata, &owner("w2", "u2"), true).unwrap();
        set_owner_reference(&mut new.metadata, &owner("w1", "u1"), false).unwrap();

        handler.on_update("default/g1", &old, &new);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_watch_owned_enqueues_owner_on_change() {
        let store = MemoryStore::<Gadget>::new();
        let queue = Arc::new(RateLimitingQueue::with_default_rate_limiter("owners"));
        let (_handle, stop) = stop_channel();

        let mut gadget = Gadget::new("default", "g1");
        set_owner_reference(&mut gadget.metadata, &owner("w1", "u1"), true).unwrap();
        store.create(gadget).await.unwrap();

        let lister = watch_owned::<Gadget>(
            &store,
            queue.clone(),
            Widget::gvk(),
            true,
            InformOptions::new(),
            stop,
        )
        .await
        .unwrap();
        assert_eq!(lister.len(), 1);
        assert_eq!(queue.get().await.as_deref(), Some("default/w1"));
        queue.done("default/w1");

        store.delete("default", "g1").await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), queue.get())
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("default/w1"));
    }
}
