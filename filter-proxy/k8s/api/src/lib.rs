#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod dynamic;
pub mod resource;

pub use self::resource::GroupResource;
pub use k8s_openapi::api::{
    self,
    core::v1::{Node, NodeSpec},
    discovery::v1::{Endpoint, EndpointSlice},
};
pub use kube::core::{DynamicObject, ObjectMeta, Resource, ResourceExt, TypeMeta};

/// The deprecated topology key that named an endpoint's node before
/// `Endpoint::node_name` existed.
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Returns the name of the node that hosts an endpoint, if it is known.
pub fn endpoint_node(endpoint: &Endpoint) -> Option<&str> {
    if let Some(name) = endpoint.node_name.as_deref() {
        return Some(name);
    }

    endpoint
        .deprecated_topology
        .as_ref()?
        .get(HOSTNAME_TOPOLOGY_KEY)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_node_prefers_node_name() {
        let ep = Endpoint {
            node_name: Some("node-a".to_string()),
            deprecated_topology: Some(
                Some((HOSTNAME_TOPOLOGY_KEY.to_string(), "node-b".to_string()))
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        assert_eq!(endpoint_node(&ep), Some("node-a"));
    }

    #[test]
    fn endpoint_node_falls_back_to_topology() {
        let ep = Endpoint {
            deprecated_topology: Some(
                Some((HOSTNAME_TOPOLOGY_KEY.to_string(), "node-b".to_string()))
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        assert_eq!(endpoint_node(&ep), Some("node-b"));
        assert_eq!(endpoint_node(&Endpoint::default()), None);
    }
}
