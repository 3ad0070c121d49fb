//! Zone-by-zone comparison of an object before and after reconciliation.

use converge_core::Resource;

/// Which zones a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationDiff {
    pub spec_changed: bool,
    pub status_changed: bool,
    pub finalizers_changed: bool,
    pub annotations_changed: bool,
    pub labels_changed: bool,
}

impl MutationDiff {
    /// Compare `before` (the snapshot taken before reconciling) with `after`.
    pub fn compute<T: Resource>(before: &T, after: &T) -> Self {
        let (old, new) = (before.meta(), after.meta());
        Self {
            spec_changed: before.spec() != after.spec(),
            status_changed: before.status() != after.status(),
            finalizers_changed: old.finalizers != new.finalizers,
            annotations_changed: old.annotations != new.annotations,
            labels_changed: old.labels != new.labels,
        }
    }

    /// Whether finalizers, annotations, or labels changed.
    pub fn metadata_changed(&self) -> bool {
        self.finalizers_changed || self.annotations_changed || self.labels_changed
    }

    /// Whether anything that will be persisted changed.
    pub fn has_writes(&self) -> bool {
        self.metadata_changed() || self.status_changed
    }
}

#[cfg(test)]
mod tests {
    use converge_core::fixtures::Widget;

    use super::*;

    #[test]
    fn test_identical_objects_have_no_changes() {
        let widget = Widget::new("default", "w1");
        let diff = MutationDiff::compute(&widget, &widget.clone());
        assert_eq!(diff, MutationDiff::default());
        assert!(!diff.has_writes());
    }

    #[test]
    fn test_each_zone_is_reported() {
        let before = Widget::new("default", "w1");

        let mut after = before.clone();
        after.spec.replicas = 4;
        let diff = MutationDiff::compute(&before, &after);
        assert!(diff.spec_changed);
        assert!(!diff.has_writes());

        let mut after = before.clone();
        after.status.phase = "Ready".into();
        assert!(MutationDiff::compute(&before, &after).status_changed);

        let mut after = before.clone();
        after.metadata.add_finalizer("example.com/cleanup");
        let diff = MutationDiff::compute(&before, &after);
        assert!(diff.finalizers_changed);
        assert!(diff.metadata_changed());

        let mut after = before.clone();
        after.metadata.annotations.insert("note".into(), "x".into());
        after.metadata.labels.insert("tier".into(), "web".into());
        let diff = MutationDiff::compute(&before, &after);
        assert!(diff.annotations_changed && diff.labels_changed);
        assert!(!diff.finalizers_changed);
    }

    #[test]
    fn test_identity_fields_are_not_metadata_changes() {
        let before = Widget::new("default", "w1");
        let mut after = before.clone();
        after.metadata.resource_version = "42".into();
        after.metadata.generation = 7;
        assert!(!MutationDiff::compute(&before, &after).metadata_changed());
    }
}
