//! Conversions between dynamically-decoded objects and typed resources.

use kube::core::DynamicObject;
use serde::{de::DeserializeOwned, Serialize};

/// Decodes a typed resource from a dynamic object without consuming it.
pub fn parse<K: DeserializeOwned>(obj: &DynamicObject) -> serde_json::Result<K> {
    serde_json::to_value(obj).and_then(serde_json::from_value)
}

/// Encodes a typed resource as a dynamic object.
pub fn to_dynamic<K: Serialize>(resource: &K) -> serde_json::Result<DynamicObject> {
    serde_json::to_value(resource).and_then(serde_json::from_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Endpoint, EndpointSlice, ObjectMeta, ResourceExt};

    #[test]
    fn endpoint_slice_roundtrips_through_dynamic() {
        let slice = EndpointSlice {
            metadata: ObjectMeta {
                namespace: Some("ns-0".to_string()),
                name: Some("svc-abc".to_string()),
                ..Default::default()
            },
            address_type: "IPv4".to_string(),
            endpoints: vec![Endpoint {
                addresses: vec!["192.0.2.10".to_string()],
                node_name: Some("node-a".to_string()),
                ..Default::default()
            }],
            ports: None,
        };

        let obj = to_dynamic(&slice).expect("slice must encode");
        assert_eq!(obj.name_any(), "svc-abc");
        assert_eq!(
            obj.types.as_ref().map(|t| t.kind.as_str()),
            Some("EndpointSlice")
        );

        let parsed = parse::<EndpointSlice>(&obj).expect("slice must decode");
        assert_eq!(parsed, slice);
    }
}
