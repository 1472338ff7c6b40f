use crate::{strip_endpoints, SharedNodePoolIndex};
use edgehub_filter_core::{Decision, DynamicObject, Filter, GroupResource, ObjectFilter};
use tracing::trace;

/// Hides endpoints hosted on nodes outside of the local node's pool.
///
/// Endpoints on nodes that the index does not know about are hidden as well, since they cannot be
/// shown to be in the local pool. If the local node is not in a pool, all endpoints are visible.
#[derive(Clone, Debug)]
pub struct NodePoolTopology {
    local: String,
    index: SharedNodePoolIndex,
}

// === impl NodePoolTopology ===

impl NodePoolTopology {
    pub const NAME: &'static str = "node-pool-topology";

    pub fn new(local: impl Into<String>, index: SharedNodePoolIndex) -> Self {
        Self {
            local: local.into(),
            index,
        }
    }

    /// Builds a filter that is not ready until the node pool index has synced.
    pub fn into_filter(self) -> Filter {
        let synced = self.index.read().sync_signal();
        Filter::new(Self::NAME)
            .with_object_filter(self)
            .depends_on(synced)
    }
}

impl ObjectFilter for NodePoolTopology {
    fn filter(&self, resource: &GroupResource, obj: &DynamicObject) -> anyhow::Result<Decision> {
        let index = self.index.read();
        let Some(pool) = index.pool_of(&self.local) else {
            trace!(node = %self.local, "Local node is not in a pool");
            return Ok(Decision::Keep);
        };

        strip_endpoints(resource, obj, |node| index.pool_of(node) != Some(pool))
    }
}
