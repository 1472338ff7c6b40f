use crate::strip_endpoints;
use ahash::AHashSet;
use edgehub_filter_core::{Decision, DynamicObject, Filter, GroupResource, ObjectFilter};

/// Hides endpoints hosted on a fixed set of nodes.
#[derive(Clone, Debug, Default)]
pub struct NodeExclusion {
    nodes: AHashSet<String>,
}

// === impl NodeExclusion ===

impl NodeExclusion {
    pub const NAME: &'static str = "node-exclusion";

    pub fn new(nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_filter(self) -> Filter {
        Filter::new(Self::NAME).with_object_filter(self)
    }
}

impl ObjectFilter for NodeExclusion {
    fn filter(&self, resource: &GroupResource, obj: &DynamicObject) -> anyhow::Result<Decision> {
        strip_endpoints(resource, obj, |node| self.nodes.contains(node))
    }
}
