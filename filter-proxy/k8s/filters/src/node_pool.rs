//! Node -> pool

use crate::SizedIndex;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use edgehub_filter_core::SyncSignal;
use edgehub_k8s_api::{Node, ResourceExt};
use kubert::index::ClusterRemoved;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// The node label that assigns a node to a pool.
pub const DEFAULT_NODE_POOL_LABEL: &str = "edgehub.io/nodepool";

/// Maps each known node to the pool named by its pool label.
///
/// The index is updated by a single task processing `Node` watch events. Its [`SyncSignal`] fires
/// once the initial listing of nodes has been applied.
#[derive(Debug)]
pub struct NodePoolIndex {
    label: String,

    /// Nodes without a pool label are known but have no pool.
    pools: HashMap<String, Option<String>>,

    synced: SyncSignal,
}

pub type SharedNodePoolIndex = Arc<RwLock<NodePoolIndex>>;

// === impl NodePoolIndex ===

impl NodePoolIndex {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pools: HashMap::default(),
            synced: SyncSignal::new(),
        }
    }

    pub fn shared(self) -> SharedNodePoolIndex {
        Arc::new(RwLock::new(self))
    }

    /// Returns a signal that fires once the index has been populated.
    pub fn sync_signal(&self) -> SyncSignal {
        self.synced.clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the pool of a node, if the node is known and labeled.
    pub fn pool_of(&self, node: &str) -> Option<&str> {
        self.pools.get(node)?.as_deref()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.pools.contains_key(node)
    }

    /// Returns the known nodes that are not in the same pool as `local`.
    ///
    /// When the local node has no pool, no nodes are excluded. Unlabeled nodes are never in the
    /// local node's pool.
    pub fn excluded_nodes_for(&self, local: &str) -> HashSet<String> {
        let Some(pool) = self.pool_of(local) else {
            return HashSet::default();
        };
        self.pools
            .iter()
            .filter(|(_, p)| p.as_deref() != Some(pool))
            .map(|(node, _)| node.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    fn pool_label(&self, node: &Node) -> Option<String> {
        node.labels().get(&self.label).cloned()
    }
}

impl kubert::index::IndexClusterResource<Node> for NodePoolIndex {
    fn apply(&mut self, node: Node) {
        let name = node.name_unchecked();
        let pool = self.pool_label(&node);
        trace!(%name, ?pool, "Applying node");
        if let Some(prior) = self.pools.insert(name.clone(), pool.clone()) {
            if prior != pool {
                debug!(%name, ?prior, ?pool, "Node changed pools");
            }
        }
    }

    fn delete(&mut self, name: String) {
        if self.pools.remove(&name).is_some() {
            debug!(%name, "Node deleted");
        }
    }

    fn reset(&mut self, nodes: Vec<Node>, removed: ClusterRemoved) {
        let pools = nodes
            .iter()
            .map(|node| (node.name_unchecked(), self.pool_label(node)))
            .collect::<HashMap<_, _>>();
        debug!(nodes = pools.len(), removed = removed.len(), "Resetting nodes");
        self.pools = pools;

        if self.synced.mark_synced() {
            info!(nodes = self.pools.len(), "Node pool index synced");
        }
    }
}

impl SizedIndex for NodePoolIndex {
    fn size(&self) -> usize {
        self.len()
    }
}
