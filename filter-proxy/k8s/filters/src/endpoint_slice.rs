use anyhow::{Context, Result};
use edgehub_filter_core::Decision;
use edgehub_k8s_api::{self as k8s, DynamicObject, GroupResource};
use serde::Deserialize;
use serde_json::Value;

/// Removes the endpoints of an `EndpointSlice` that are hosted on excluded nodes.
///
/// Objects of other resource types, slices without endpoints, and endpoints whose node is not known
/// are left untouched. When every endpoint is removed the slice is dropped entirely.
pub fn strip_endpoints(
    resource: &GroupResource,
    obj: &DynamicObject,
    is_excluded: impl Fn(&str) -> bool,
) -> Result<Decision> {
    if !is_endpoint_slices(resource) {
        return Ok(Decision::Keep);
    }

    let endpoints = match obj.data.get("endpoints") {
        Some(Value::Array(endpoints)) if !endpoints.is_empty() => endpoints,
        Some(Value::Array(_)) | Some(Value::Null) | None => return Ok(Decision::Keep),
        Some(_) => anyhow::bail!("endpoints must be a list"),
    };

    let mut kept = Vec::with_capacity(endpoints.len());
    for raw in endpoints {
        let endpoint = k8s::Endpoint::deserialize(raw).context("invalid endpoint")?;
        match k8s::endpoint_node(&endpoint) {
            Some(node) if is_excluded(node) => {}
            _ => kept.push(raw.clone()),
        }
    }

    if kept.len() == endpoints.len() {
        return Ok(Decision::Keep);
    }
    if kept.is_empty() {
        return Ok(Decision::Drop);
    }

    let mut slice = obj.clone();
    slice.data["endpoints"] = Value::Array(kept);
    Ok(Decision::Replace(slice))
}

fn is_endpoint_slices(resource: &GroupResource) -> bool {
    resource.group == "discovery.k8s.io" && resource.resource == "endpointslices"
}
