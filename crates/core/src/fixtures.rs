//! Small resource types used by tests across the workspace.
//!
//! `Widget` plays the owning resource and `Gadget` the subordinate.

use serde::{Deserialize, Serialize};

use crate::gvk::GroupVersionKind;
use crate::meta::ObjectMeta;
use crate::resource::Resource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub metadata: ObjectMeta,
    pub spec: WidgetSpec,
    pub status: WidgetStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub replicas: u32,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetStatus {
    pub ready: u32,
    pub phase: String,
}

impl Widget {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.spec.replicas = replicas;
        self
    }
}

impl Resource for Widget {
    type Spec = WidgetSpec;
    type Status = WidgetStatus;

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::new("example.com", "v1", "Widget")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &WidgetSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut WidgetSpec {
        &mut self.spec
    }

    fn status(&self) -> &WidgetStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut WidgetStatus {
        &mut self.status
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gadget {
    pub metadata: ObjectMeta,
    pub spec: GadgetSpec,
    pub status: GadgetStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetSpec {
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetStatus {
    pub healthy: bool,
}

impl Gadget {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            ..Self::default()
        }
    }
}

impl Resource for Gadget {
    type Spec = GadgetSpec;
    type Status = GadgetStatus;

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::new("", "v1", "Gadget")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &GadgetSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut GadgetSpec {
        &mut self.spec
    }

    fn status(&self) -> &GadgetStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut GadgetStatus {
        &mut self.status
    }
}
