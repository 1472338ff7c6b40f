//! Object filters that restrict the endpoints an edge node can see.
//!
//! Edge nodes are frequently unable to reach workloads on nodes outside their own site. The
//! filters in this crate rewrite `EndpointSlice` objects so that components like `kube-proxy` and
//! `coredns` only route to endpoints hosted on reachable nodes:
//!
//! - [`NodeExclusion`] strips endpoints hosted on a fixed set of nodes.
//! - [`NodePoolTopology`] strips endpoints hosted on nodes outside the local node's pool, as
//!   recorded by a [`NodePoolIndex`] that watches `Node` labels.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod endpoint_slice;
mod metrics;
mod node_exclusion;
mod node_pool;
mod topology;

#[cfg(test)]
mod tests;

pub use self::{
    endpoint_slice::strip_endpoints,
    metrics::{IndexMetrics, SizedIndex},
    node_exclusion::NodeExclusion,
    node_pool::{NodePoolIndex, SharedNodePoolIndex, DEFAULT_NODE_POOL_LABEL},
    topology::NodePoolTopology,
};
