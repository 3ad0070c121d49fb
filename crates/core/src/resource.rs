//! The capability contract every reconcilable resource type implements.

use std::fmt::Debug;

use crate::gvk::GroupVersionKind;
use crate::meta::ObjectMeta;

/// A typed resource with three zones: spec, status, and metadata.
///
/// - **spec** is desired-state input written by external actors. A controller
///   never persists changes to it.
/// - **status** is observed-state output owned by the controller.
/// - **metadata** carries identity plus the labels, annotations, and
///   finalizers a controller may change.
///
/// Zone equality comes from the `PartialEq` bounds on [`Resource::Spec`] and
/// [`Resource::Status`]; metadata equality from [`ObjectMeta`].
pub trait Resource: Clone + Debug + Send + Sync + 'static {
    /// Desired-state zone.
    type Spec: Clone + PartialEq + Debug + Send + Sync;
    /// Observed-state zone.
    type Status: Clone + PartialEq + Debug + Send + Sync;

    /// Type identity of this resource.
    fn gvk() -> GroupVersionKind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn spec(&self) -> &Self::Spec;

    /// Mutable spec access. Only external writers (and the store) should
    /// use this; reconcilers that change the spec have the change discarded.
    fn spec_mut(&mut self) -> &mut Self::Spec;

    fn status(&self) -> &Self::Status;

    fn status_mut(&mut self) -> &mut Self::Status;

    /// The queue key of this object.
    fn key(&self) -> String {
        self.meta().key()
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures::Widget;
    use super::*;

    #[test]
    fn test_key_comes_from_metadata() {
        let widget = Widget::new("default", "w1");
        assert_eq!(widget.key(), "default/w1");
    }

    #[test]
    fn test_zone_accessors() {
        let mut widget = Widget::new("default", "w1");
        widget.status_mut().ready = 3;
        widget.spec_mut().replicas = 5;
        assert_eq!(widget.status().ready, 3);
        assert_eq!(widget.spec().replicas, 5);
        assert_eq!(Widget::gvk().kind, "Widget");
    }
}
