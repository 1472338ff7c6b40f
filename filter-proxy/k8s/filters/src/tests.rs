use super::*;
use edgehub_filter_core::{Decision, DynamicObject, GroupResource, ObjectFilter};
use edgehub_k8s_api::{Node, ObjectMeta};
use kube::runtime::watcher;
use kubert::index::IndexClusterResource;
use maplit::{btreemap, convert_args};
use serde_json::json;

fn endpoint_slices() -> GroupResource {
    GroupResource::new("discovery.k8s.io", "endpointslices")
}

fn mk_slice(endpoints: serde_json::Value) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "discovery.k8s.io/v1",
        "kind": "EndpointSlice",
        "metadata": {
            "name": "web-abc12",
            "namespace": "default",
            "resourceVersion": "10",
        },
        "addressType": "IPv4",
        "endpoints": endpoints,
        "ports": [{ "name": "http", "port": 8080, "protocol": "TCP" }],
    }))
    .expect("slice must decode")
}

fn mk_endpoint(ip: &str, node: &str) -> serde_json::Value {
    json!({
        "addresses": [ip],
        "conditions": { "ready": true },
        "nodeName": node,
    })
}

fn mk_node(name: &str, pool: Option<&str>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: pool.map(|pool| convert_args!(btreemap!(DEFAULT_NODE_POOL_LABEL => pool))),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn node_names(obj: &DynamicObject) -> Vec<String> {
    obj.data["endpoints"]
        .as_array()
        .expect("endpoints must be a list")
        .iter()
        .map(|ep| ep["nodeName"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn mk_index(nodes: impl IntoIterator<Item = Node>) -> SharedNodePoolIndex {
    let index = NodePoolIndex::new(DEFAULT_NODE_POOL_LABEL).shared();
    index
        .write()
        .reset(nodes.into_iter().collect(), Default::default());
    index
}

#[test]
fn strips_excluded_endpoints() {
    let filter = NodeExclusion::new(["node-b"]);
    let slice = mk_slice(json!([
        mk_endpoint("10.0.0.1", "node-a"),
        mk_endpoint("10.0.0.2", "node-b"),
    ]));

    let replaced = match filter.filter(&endpoint_slices(), &slice).unwrap() {
        Decision::Replace(obj) => obj,
        decision => panic!("unexpected decision: {decision:?}"),
    };
    assert_eq!(node_names(&replaced), vec!["node-a"]);
    assert_eq!(replaced.metadata, slice.metadata);
    assert_eq!(replaced.data["ports"], slice.data["ports"]);
    assert_eq!(
        node_names(&slice),
        vec!["node-a", "node-b"],
        "input must not be modified"
    );

    // Filtering an already-filtered slice changes nothing.
    assert!(matches!(
        filter.filter(&endpoint_slices(), &replaced).unwrap(),
        Decision::Keep
    ));
}

#[test]
fn drops_slices_without_remaining_endpoints() {
    let filter = NodeExclusion::new(["node-b"]);
    let slice = mk_slice(json!([mk_endpoint("10.0.0.2", "node-b")]));
    assert!(matches!(
        filter.filter(&endpoint_slices(), &slice).unwrap(),
        Decision::Drop
    ));
}

#[test]
fn keeps_slices_without_endpoints() {
    let filter = NodeExclusion::new(["node-b"]);
    assert!(matches!(
        filter.filter(&endpoint_slices(), &mk_slice(json!([]))).unwrap(),
        Decision::Keep
    ));
    assert!(matches!(
        filter
            .filter(&endpoint_slices(), &mk_slice(serde_json::Value::Null))
            .unwrap(),
        Decision::Keep
    ));
}

#[test]
fn keeps_endpoints_without_nodes() {
    let filter = NodeExclusion::new(["node-b"]);
    let slice = mk_slice(json!([
        { "addresses": ["10.0.0.3"] },
        mk_endpoint("10.0.0.2", "node-b"),
    ]));
    match filter.filter(&endpoint_slices(), &slice).unwrap() {
        Decision::Replace(obj) => assert_eq!(node_names(&obj), vec![""]),
        decision => panic!("unexpected decision: {decision:?}"),
    }
}

#[test]
fn uses_deprecated_topology() {
    let filter = NodeExclusion::new(["node-b"]);
    let slice = mk_slice(json!([{
        "addresses": ["10.0.0.2"],
        "deprecatedTopology": { "kubernetes.io/hostname": "node-b" },
    }]));
    assert!(matches!(
        filter.filter(&endpoint_slices(), &slice).unwrap(),
        Decision::Drop
    ));
}

#[test]
fn ignores_other_resources() {
    let filter = NodeExclusion::new(["node-b"]);
    let slice = mk_slice(json!([mk_endpoint("10.0.0.2", "node-b")]));
    assert!(matches!(
        filter
            .filter(&GroupResource::new("", "endpoints"), &slice)
            .unwrap(),
        Decision::Keep
    ));
}

#[test]
fn rejects_malformed_endpoints() {
    let filter = NodeExclusion::new(["node-b"]);
    assert!(filter
        .filter(&endpoint_slices(), &mk_slice(json!("node-b")))
        .is_err());
    assert!(filter
        .filter(&endpoint_slices(), &mk_slice(json!([{ "addresses": "10.0.0.2" }])))
        .is_err());
}

#[test]
fn node_exclusion_filter() {
    assert!(NodeExclusion::default().is_empty());
    let filter = NodeExclusion::new(["node-b"]).into_filter();
    assert_eq!(filter.name(), NodeExclusion::NAME);
    assert!(filter.has_object_filter());
    assert!(filter.dependencies().is_empty());
}

#[test]
fn topology_keeps_local_pool() {
    let index = mk_index([
        mk_node("node-a", Some("hangzhou")),
        mk_node("node-b", Some("hangzhou")),
        mk_node("node-c", Some("beijing")),
        mk_node("node-d", None),
    ]);
    let filter = NodePoolTopology::new("node-a", index);
    let slice = mk_slice(json!([
        mk_endpoint("10.0.0.1", "node-a"),
        mk_endpoint("10.0.0.2", "node-b"),
        mk_endpoint("10.0.0.3", "node-c"),
        mk_endpoint("10.0.0.4", "node-d"),
        mk_endpoint("10.0.0.5", "node-unknown"),
    ]));

    match filter.filter(&endpoint_slices(), &slice).unwrap() {
        Decision::Replace(obj) => assert_eq!(node_names(&obj), vec!["node-a", "node-b"]),
        decision => panic!("unexpected decision: {decision:?}"),
    }

    let remote = mk_slice(json!([mk_endpoint("10.0.0.3", "node-c")]));
    assert!(matches!(
        filter.filter(&endpoint_slices(), &remote).unwrap(),
        Decision::Drop
    ));
}

#[test]
fn topology_keeps_everything_without_local_pool() {
    let index = mk_index([
        mk_node("node-a", None),
        mk_node("node-c", Some("beijing")),
    ]);
    let filter = NodePoolTopology::new("node-a", index.clone());
    let slice = mk_slice(json!([mk_endpoint("10.0.0.3", "node-c")]));
    assert!(matches!(
        filter.filter(&endpoint_slices(), &slice).unwrap(),
        Decision::Keep
    ));

    // The filter observes index updates.
    index.write().apply(mk_node("node-a", Some("hangzhou")));
    assert!(matches!(
        filter.filter(&endpoint_slices(), &slice).unwrap(),
        Decision::Drop
    ));
}

#[test]
fn topology_filter_depends_on_index() {
    let index = NodePoolIndex::new(DEFAULT_NODE_POOL_LABEL).shared();
    let filter = NodePoolTopology::new("node-a", index.clone()).into_filter();
    assert_eq!(filter.name(), NodePoolTopology::NAME);
    assert_eq!(filter.dependencies().len(), 1);
    assert!(!filter.dependencies()[0].is_synced());

    index.write().reset(vec![], Default::default());
    assert!(filter.dependencies()[0].is_synced());
}

#[test]
fn index_tracks_nodes() {
    let mut index = NodePoolIndex::new("example.com/pool");
    let signal = index.sync_signal();
    assert_eq!(index.label(), "example.com/pool");

    let mut node = mk_node("node-a", None);
    node.metadata.labels = Some(convert_args!(btreemap!("example.com/pool" => "edge")));
    index.apply(node);
    index.apply(mk_node("node-b", Some("edge")));
    assert_eq!(index.pool_of("node-a"), Some("edge"));
    assert_eq!(index.pool_of("node-b"), None, "other labels are ignored");
    assert!(index.contains("node-b"));
    assert!(!signal.is_synced(), "only a reset syncs the index");

    index.delete("node-a".to_string());
    assert!(!index.contains("node-a"));
    index.delete("node-a".to_string());
    assert_eq!(index.len(), 1);
}

#[test]
fn index_reset_replaces_nodes() {
    let index = mk_index([
        mk_node("node-a", Some("hangzhou")),
        mk_node("node-b", Some("beijing")),
    ]);
    assert!(index.read().sync_signal().is_synced());

    index.write().reset(
        vec![
            mk_node("node-a", Some("beijing")),
            mk_node("node-c", Some("beijing")),
        ],
        Default::default(),
    );
    let index = index.read();
    assert_eq!(index.len(), 2);
    assert!(!index.contains("node-b"), "stale nodes must be removed");
    assert_eq!(index.pool_of("node-a"), Some("beijing"));
    assert!(index.sync_signal().is_synced());
}

#[test]
fn excluded_nodes() {
    let index = mk_index([
        mk_node("node-a", Some("hangzhou")),
        mk_node("node-b", Some("hangzhou")),
        mk_node("node-c", Some("beijing")),
        mk_node("node-d", None),
    ]);
    let index = index.read();

    let mut excluded = index.excluded_nodes_for("node-a").into_iter().collect::<Vec<_>>();
    excluded.sort();
    assert_eq!(excluded, vec!["node-c", "node-d"]);

    assert!(index.excluded_nodes_for("node-d").is_empty());
    assert!(index.excluded_nodes_for("node-unknown").is_empty());
}

#[tokio::test]
async fn index_follows_watch() {
    let _tracing = tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    );

    let index = NodePoolIndex::new(DEFAULT_NODE_POOL_LABEL).shared();
    let signal = index.read().sync_signal();
    let events = futures::stream::iter(vec![
        watcher::Event::Init,
        watcher::Event::InitApply(mk_node("node-a", Some("hangzhou"))),
        watcher::Event::InitApply(mk_node("node-b", Some("beijing"))),
        watcher::Event::InitDone,
        watcher::Event::Apply(mk_node("node-c", Some("hangzhou"))),
        watcher::Event::Delete(mk_node("node-b", Some("beijing"))),
    ]);

    kubert::index::cluster(index.clone(), events).await;

    assert!(signal.is_synced());
    let index = index.read();
    assert_eq!(index.pool_of("node-a"), Some("hangzhou"));
    assert_eq!(index.pool_of("node-c"), Some("hangzhou"));
    assert!(!index.contains("node-b"));
}

#[test]
fn index_metrics() {
    let mut prom = prometheus_client::registry::Registry::default();
    let index = NodePoolIndex::new(DEFAULT_NODE_POOL_LABEL).shared();
    let mut metrics = IndexMetrics::register(index.clone(), &mut prom);

    IndexClusterResource::<Node>::reset(
        &mut metrics,
        vec![mk_node("node-a", Some("hangzhou"))],
        Default::default(),
    );
    metrics.apply(mk_node("node-b", Some("hangzhou")));
    IndexClusterResource::<Node>::delete(&mut metrics, "node-a".to_string());
    assert_eq!(index.read().len(), 1);

    let mut text = String::new();
    prometheus_client::encoding::text::encode(&mut text, &prom).unwrap();
    assert!(text.contains("index_size{kind=\"Node\"} 1"), "{text}");
    assert!(text.contains("index_applies_total{kind=\"Node\"} 1"), "{text}");
    assert!(text.contains("index_resets_total{kind=\"Node\"} 1"), "{text}");
}
