//! Derives a [`RequestDescriptor`] from an API request's method, path, and headers.

use crate::core::{RequestDescriptor, Verb};
use crate::k8s::GroupResource;
use http::{header, request::Parts, Method};

/// Namespace subresources that are not namespaced resources in their own right.
const NAMESPACE_SUBRESOURCES: [&str; 2] = ["status", "finalize"];

pub(crate) fn describe(parts: &Parts) -> RequestDescriptor {
    let caller = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .and_then(caller_of);
    let accept = parts
        .headers
        .get(header::ACCEPT)
        .and_then(|a| a.to_str().ok())
        .map(ToString::to_string);

    let mut desc = resource_request(&parts.method, parts.uri.path(), parts.uri.query())
        .unwrap_or_else(|| RequestDescriptor {
            verb: non_resource_verb(&parts.method),
            ..Default::default()
        });
    desc.caller = caller;
    desc.accept = accept;
    desc
}

/// Returns the component name from a `User-Agent` header, e.g. `kube-proxy` from
/// `kube-proxy/v1.33.0 (linux/amd64) kubernetes/abcdef`.
fn caller_of(user_agent: &str) -> Option<String> {
    let product = user_agent.split_whitespace().next()?;
    let name = product.split('/').next()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

fn resource_request(method: &Method, path: &str, query: Option<&str>) -> Option<RequestDescriptor> {
    let mut parts = path.trim_matches('/').split('/').collect::<Vec<_>>();
    let group = match parts.first()? {
        &"api" if parts.len() >= 2 => {
            parts.drain(..2);
            String::new()
        }
        &"apis" if parts.len() >= 3 => {
            let group = parts[1].to_string();
            parts.drain(..3);
            group
        }
        _ => return None,
    };

    // Discovery requests, like `/api/v1`, do not address a resource.
    if parts.is_empty() {
        return None;
    }

    // Legacy watch requests are prefixed, e.g. `/api/v1/watch/namespaces/default/pods`.
    let mut watch = if parts[0] == "watch" {
        parts.remove(0);
        true
    } else {
        false
    };
    watch = watch || query.map(is_watch_query).unwrap_or(false);

    let mut namespace = None;
    if parts.first() == Some(&"namespaces") && parts.len() > 1 {
        namespace = Some(parts[1].to_string());
        if parts.len() > 2 && !NAMESPACE_SUBRESOURCES.contains(&parts[2]) {
            parts.drain(..2);
        }
    }

    let resource = parts.first().filter(|r| !r.is_empty())?.to_string();
    let name = parts.get(1).map(ToString::to_string);
    let subresource = parts.get(2).map(ToString::to_string);

    // A namespace is not within itself.
    if resource == "namespaces" {
        namespace = None;
    }

    let verb = match *method {
        Method::POST => Verb::Create,
        Method::GET if watch => Verb::Watch,
        Method::GET if name.is_none() => Verb::List,
        // HEAD responses carry no body, so there are never objects to inspect.
        Method::GET | Method::HEAD => Verb::Get,
        Method::PUT => Verb::Update,
        Method::PATCH => Verb::Patch,
        Method::DELETE if name.is_none() => Verb::DeleteCollection,
        Method::DELETE => Verb::Delete,
        _ => Verb::Get,
    };

    Some(RequestDescriptor {
        verb,
        resource: Some(GroupResource::new(group, resource)),
        subresource,
        namespace,
        name,
        caller: None,
        accept: None,
    })
}

fn is_watch_query(query: &str) -> bool {
    query.split('&').any(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        key == "watch" && matches!(value, "true" | "1")
    })
}

fn non_resource_verb(method: &Method) -> Verb {
    match *method {
        Method::POST => Verb::Create,
        Method::PUT => Verb::Update,
        Method::PATCH => Verb::Patch,
        Method::DELETE => Verb::Delete,
        _ => Verb::Get,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn describe_req(method: Method, uri: &str) -> RequestDescriptor {
        let (parts, ()) = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::USER_AGENT, "kube-proxy/v1.33.0 (linux/amd64) kubernetes/6b1d2a6")
            .header(header::ACCEPT, "application/vnd.kubernetes.protobuf, */*")
            .body(())
            .unwrap()
            .into_parts();
        describe(&parts)
    }

    fn endpoint_slices() -> GroupResource {
        GroupResource::new("discovery.k8s.io", "endpointslices")
    }

    #[test]
    fn lists_and_watches() {
        let list = describe_req(Method::GET, "/apis/discovery.k8s.io/v1/endpointslices?limit=500");
        assert_eq!(list.verb, Verb::List);
        assert_eq!(list.resource, Some(endpoint_slices()));
        assert_eq!(list.namespace, None);
        assert_eq!(list.caller.as_deref(), Some("kube-proxy"));
        assert_eq!(
            list.accept.as_deref(),
            Some("application/vnd.kubernetes.protobuf, */*")
        );

        let watch = describe_req(
            Method::GET,
            "/apis/discovery.k8s.io/v1/endpointslices?allowWatchBookmarks=true&watch=true",
        );
        assert_eq!(watch.verb, Verb::Watch);
        assert_eq!(watch.resource, Some(endpoint_slices()));

        let watch = describe_req(Method::GET, "/api/v1/watch/namespaces/kube-system/services");
        assert_eq!(watch.verb, Verb::Watch);
        assert_eq!(watch.resource, Some(GroupResource::new("", "services")));
        assert_eq!(watch.namespace.as_deref(), Some("kube-system"));

        let not_watch = describe_req(Method::GET, "/api/v1/services?watch=false");
        assert_eq!(not_watch.verb, Verb::List);
    }

    #[test]
    fn head_requests_are_gets() {
        let head = describe_req(Method::HEAD, "/apis/discovery.k8s.io/v1/endpointslices");
        assert_eq!(head.verb, Verb::Get);
        assert_eq!(head.resource, Some(endpoint_slices()));

        let head = describe_req(Method::HEAD, "/api/v1/services?watch=true");
        assert_eq!(head.verb, Verb::Get);
    }

    #[test]
    fn namespaced_objects() {
        let get = describe_req(Method::GET, "/api/v1/namespaces/default/pods/web-0/status");
        assert_eq!(get.verb, Verb::Get);
        assert_eq!(get.resource, Some(GroupResource::new("", "pods")));
        assert_eq!(get.namespace.as_deref(), Some("default"));
        assert_eq!(get.name.as_deref(), Some("web-0"));
        assert_eq!(get.subresource.as_deref(), Some("status"));

        let delete = describe_req(Method::DELETE, "/apis/apps/v1/namespaces/default/deployments");
        assert_eq!(delete.verb, Verb::DeleteCollection);
        assert_eq!(delete.resource, Some(GroupResource::new("apps", "deployments")));

        let patch = describe_req(Method::PATCH, "/apis/apps/v1/namespaces/default/deployments/web");
        assert_eq!(patch.verb, Verb::Patch);
        assert_eq!(patch.name.as_deref(), Some("web"));

        let create = describe_req(Method::POST, "/api/v1/namespaces/default/configmaps");
        assert_eq!(create.verb, Verb::Create);
        assert_eq!(create.name, None);
    }

    #[test]
    fn namespaces() {
        let list = describe_req(Method::GET, "/api/v1/namespaces");
        assert_eq!(list.verb, Verb::List);
        assert_eq!(list.resource, Some(GroupResource::new("", "namespaces")));

        let get = describe_req(Method::GET, "/api/v1/namespaces/kube-system");
        assert_eq!(get.verb, Verb::Get);
        assert_eq!(get.resource, Some(GroupResource::new("", "namespaces")));
        assert_eq!(get.name.as_deref(), Some("kube-system"));
        assert_eq!(get.namespace, None);

        let finalize = describe_req(Method::PUT, "/api/v1/namespaces/stale/finalize");
        assert_eq!(finalize.verb, Verb::Update);
        assert_eq!(finalize.name.as_deref(), Some("stale"));
        assert_eq!(finalize.subresource.as_deref(), Some("finalize"));
    }

    #[test]
    fn non_resource_requests() {
        for uri in ["/version", "/healthz", "/api", "/apis", "/apis/apps/v1", "/api/v1"] {
            let desc = describe_req(Method::GET, uri);
            assert_eq!(desc.resource, None, "{uri}");
            assert_eq!(desc.verb, Verb::Get, "{uri}");
            assert_eq!(desc.caller.as_deref(), Some("kube-proxy"));
        }
    }

    #[test]
    fn callers() {
        assert_eq!(caller_of("coredns/1.11.3 (linux/arm64)").as_deref(), Some("coredns"));
        assert_eq!(caller_of("kubelet").as_deref(), Some("kubelet"));
        assert_eq!(caller_of("/v1"), None);
        assert_eq!(caller_of(""), None);
    }
}
