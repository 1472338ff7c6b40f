use crate::{
    core::{ConfigError, Manager, Predicate, Registry},
    filters::{
        IndexMetrics, NodeExclusion, NodePoolIndex, NodePoolTopology, SharedNodePoolIndex,
        DEFAULT_NODE_POOL_LABEL,
    },
    k8s::Node,
    mux::{Multiplexer, StreamMetrics},
    proxy::{self, Proxy},
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry as PromRegistry;
use std::net::SocketAddr;
use tracing::{info, info_span, Instrument};

/// Selects the requests whose `EndpointSlice` responses are filtered.
pub const DEFAULT_ENDPOINT_FILTER_PREDICATE: &str =
    "resources=endpointslices.discovery.k8s.io;verbs=list,watch;callers=kube-proxy,coredns";

#[derive(Debug, Parser)]
#[clap(
    name = "filter-proxy",
    about = "Filters Kubernetes API responses served to edge node components"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "edgehub=info,warn",
        env = "EDGEHUB_FILTER_PROXY_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "127.0.0.1:10261")]
    proxy_addr: SocketAddr,

    /// The name of the node on which the proxy runs.
    #[clap(long, env = "NODE_NAME")]
    node_name: String,

    /// Nodes whose endpoints are never served to callers.
    ///
    /// When set, this takes precedence over node pool topology.
    #[clap(long, value_delimiter = ',')]
    excluded_nodes: Vec<String>,

    /// The requests to which endpoint filters apply.
    #[clap(long, default_value = DEFAULT_ENDPOINT_FILTER_PREDICATE)]
    endpoint_filter_predicate: Predicate,

    /// The number of response chunks buffered for each caller.
    #[clap(long, default_value = "16")]
    stream_buffer: usize,

    /// The node label that assigns nodes to pools.
    #[clap(long, default_value = DEFAULT_NODE_POOL_LABEL)]
    node_pool_label: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            proxy_addr,
            node_name,
            excluded_nodes,
            endpoint_filter_predicate,
            stream_buffer,
            node_pool_label,
        } = self;

        let node_pools = NodePoolIndex::new(node_pool_label).shared();
        let manager = mk_manager(
            &node_name,
            excluded_nodes,
            endpoint_filter_predicate,
            node_pools.clone(),
        )?;
        info!(
            node = %node_name,
            filters = ?manager.registry().names().collect::<Vec<_>>(),
            "Configured filters",
        );

        let mut prom = <PromRegistry>::default();
        let node_pools_metrics = IndexMetrics::register(
            node_pools.clone(),
            prom.sub_registry_with_prefix("node_pool_index"),
        )
        .shared();
        let stream_metrics = StreamMetrics::register(prom.sub_registry_with_prefix("proxy"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn resource watches.

        let nodes = runtime.watch_all::<Node>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(node_pools_metrics, nodes).instrument(info_span!("nodes")),
        );

        // Run the proxy server, filtering responses with the configured filters.
        let mux = Multiplexer::new(stream_metrics, runtime.shutdown_handle());
        let proxy = Proxy::new(runtime.client(), manager, mux, stream_buffer);
        tokio::spawn(proxy::serve(proxy_addr, proxy, runtime.shutdown_handle()));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Registers the endpoint filters for the local node.
///
/// Only one object filter applies to a request, so an explicit node exclusion list overrides node
/// pool topology.
pub(crate) fn mk_manager(
    node_name: &str,
    excluded_nodes: Vec<String>,
    predicate: Predicate,
    node_pools: SharedNodePoolIndex,
) -> Result<Manager, ConfigError> {
    let mut registry = Registry::default();

    let exclusion = NodeExclusion::new(excluded_nodes);
    if !exclusion.is_empty() {
        registry.register(exclusion.into_filter(), predicate.clone())?;
    }
    registry.register(
        NodePoolTopology::new(node_name, node_pools).into_filter(),
        predicate,
    )?;

    Ok(Manager::new(registry))
}
