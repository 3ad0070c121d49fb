//! The reconciliation contract.

use async_trait::async_trait;
use converge_core::Resource;
use futures::future::BoxFuture;

/// User logic that drives one object toward its desired state.
///
/// `reconcile` receives the latest stored object and mutates it in place.
/// On `Ok`, changed finalizers, labels, annotations, and status are persisted;
/// spec changes are discarded. On `Err`, nothing is persisted and the error is
/// routed by [`crate::Outcome::classify`].
#[async_trait]
pub trait Reconciler<T: Resource>: Send + Sync {
    async fn reconcile(&self, obj: &mut T) -> anyhow::Result<()>;
}

/// A [`Reconciler`] backed by a closure.
pub struct ReconcilerFn<F> {
    f: F,
}

/// Wrap a closure as a [`Reconciler`].
///
/// ```ignore
/// let reconciler = reconciler_fn(|widget: &mut Widget| {
///     Box::pin(async move {
///         widget.status.ready = widget.spec.replicas;
///         anyhow::Ok(())
///     })
/// });
/// ```
pub fn reconciler_fn<T, F>(f: F) -> ReconcilerFn<F>
where
    T: Resource,
    F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync,
{
    ReconcilerFn { f }
}

#[async_trait]
impl<T, F> Reconciler<T> for ReconcilerFn<F>
where
    T: Resource,
    F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync,
{
    async fn reconcile(&self, obj: &mut T) -> anyhow::Result<()> {
        (self.f)(obj).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use converge_core::fixtures::Widget;

    use super::*;

    #[tokio::test]
    async fn test_closure_reconciler_mutates_object() {
        let reconciler = reconciler_fn(|widget: &mut Widget| {
            Box::pin(async move {
                widget.status.ready = widget.spec.replicas;
                anyhow::Ok(())
            })
        });

        let mut widget = Widget::new("default", "w1").with_replicas(3);
        reconciler.reconcile(&mut widget).await.unwrap();
        assert_eq!(widget.status.ready, 3);
    }

    #[tokio::test]
    async fn test_closure_errors_propagate() {
        let reconciler =
            reconciler_fn(|_: &mut Widget| Box::pin(async { Err::<(), _>(anyhow::anyhow!("boom")) }));
        let mut widget = Widget::new("default", "w1");
        assert!(reconciler.reconcile(&mut widget).await.is_err());
    }
}
