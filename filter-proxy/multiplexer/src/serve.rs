use crate::{
    frames::LineFrames,
    list::filter_list,
    metrics::{Outcome, StreamMetrics},
    watch::WatchFilter,
    Downstream, Error, Status,
};
use bytes::{Bytes, BytesMut};
use edgehub_filter_core::{
    ByteStream, Decision, DynamicObject, FilterManager, GroupResource, RequestDescriptor,
    ResolvedObjectFilter, ResolvedResponseFilter, Verb,
};
use futures::{future::BoxFuture, prelude::*};
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// Streams upstream response bodies to callers, applying filters.
#[derive(Clone, Debug)]
pub struct Multiplexer {
    metrics: StreamMetrics,
    drain: drain::Watch,
}

/// The filters resolved for a request.
#[derive(Clone, Debug, Default)]
pub struct Filters {
    pub response: Option<ResolvedResponseFilter>,
    pub object: Option<ResolvedObjectFilter>,
}

/// An object filter bound to the resource of a single request.
pub(crate) struct ObjectFilterCtx<'a> {
    filter: &'a ResolvedObjectFilter,
    resource: &'a GroupResource,
    metrics: &'a StreamMetrics,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Passthrough,
    Response,
    List,
    Watch,
}

/// A single stream's upstream and downstream halves.
struct Conn {
    upstream: ByteStream,
    downstream: Downstream,
    shutdown: BoxFuture<'static, ()>,
}

/// Why a stream stopped before the upstream body ended.
enum Stop {
    Disconnected,
    Shutdown,
    Failed(Error),
}

// === impl Multiplexer ===

impl Multiplexer {
    pub fn new(metrics: StreamMetrics, drain: drain::Watch) -> Self {
        Self { metrics, drain }
    }

    /// Streams an upstream body to the caller, returning once the stream has terminated.
    ///
    /// A response filter takes precedence over an object filter. Objects are only decoded for list
    /// and watch requests; all other bodies are forwarded unmodified.
    pub async fn serve(
        &self,
        req: &RequestDescriptor,
        filters: Filters,
        upstream: ByteStream,
        downstream: Downstream,
    ) -> Status {
        let mode = Mode::of(req, &filters);
        let observer = self.metrics.start(mode.as_str());
        let upstream = match &filters.response {
            Some(filter) => {
                debug!(filter = %filter.name(), "Filtering response");
                filter.filter(req, upstream)
            }
            None => upstream,
        };
        let drain = self.drain.clone();
        let mut conn = Conn {
            upstream,
            downstream,
            shutdown: Box::pin(drain.signaled().map(|_release| ())),
        };

        let res = match (mode, &filters, req.resource.as_ref()) {
            (Mode::List, Filters { object: Some(filter), .. }, Some(resource)) => {
                let ctx = ObjectFilterCtx::new(filter, resource, &self.metrics);
                conn.list(&ctx).await
            }
            (Mode::Watch, Filters { object: Some(filter), .. }, Some(resource)) => {
                let ctx = ObjectFilterCtx::new(filter, resource, &self.metrics);
                conn.watch(&ctx).await
            }
            _ => conn.forward().await,
        };

        let status = match res {
            Ok(()) => Status::ClosedNormally,
            Err(Stop::Shutdown) => {
                debug!("Closing stream for shutdown");
                Status::ClosedNormally
            }
            Err(Stop::Disconnected) => Status::DownstreamDisconnected,
            Err(Stop::Failed(error)) => {
                let error = Arc::new(error);
                conn.fail(error.clone());
                Status::UpstreamError(error)
            }
        };
        match &status {
            Status::UpstreamError(error) => tracing::info!(%error, "Stream failed"),
            status => debug!(status = status.as_str(), "Stream complete"),
        }
        observer.end(&status);
        status
    }

    /// Spawns a task that streams an upstream body to the caller.
    pub fn spawn(
        &self,
        req: RequestDescriptor,
        filters: Filters,
        upstream: ByteStream,
        downstream: Downstream,
    ) -> tokio::task::JoinHandle<Status> {
        let mux = self.clone();
        let span = info_span!("stream", %req);
        tokio::spawn(
            async move { mux.serve(&req, filters, upstream, downstream).await }.instrument(span),
        )
    }
}

// === impl Filters ===

impl Filters {
    pub fn resolve(manager: &impl FilterManager, req: &RequestDescriptor) -> Self {
        Self {
            response: manager.find_response_filter(req),
            object: manager.find_object_filter(req),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.response.is_none() && self.object.is_none()
    }

    /// Indicates whether the response body will be decoded into objects.
    pub fn decodes_objects(&self, req: &RequestDescriptor) -> bool {
        matches!(Mode::of(req, self), Mode::List | Mode::Watch)
    }
}

// === impl Mode ===

impl Mode {
    fn of(req: &RequestDescriptor, filters: &Filters) -> Self {
        if filters.response.is_some() {
            return Self::Response;
        }
        if filters.object.is_none() || req.resource.is_none() {
            return Self::Passthrough;
        }
        match req.verb {
            Verb::List => Self::List,
            Verb::Watch => Self::Watch,
            _ => Self::Passthrough,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Response => "response",
            Self::List => "list",
            Self::Watch => "watch",
        }
    }
}

// === impl ObjectFilterCtx ===

impl<'a> ObjectFilterCtx<'a> {
    fn new(
        filter: &'a ResolvedObjectFilter,
        resource: &'a GroupResource,
        metrics: &'a StreamMetrics,
    ) -> Self {
        Self {
            filter,
            resource,
            metrics,
        }
    }

    /// Applies the filter to an object, recording its decision.
    pub(crate) fn decide(&self, obj: &DynamicObject) -> Result<Decision, Error> {
        let decision = self
            .filter
            .filter(self.resource, obj)
            .map_err(|error| Error::Filter {
                filter: self.filter.name().to_string(),
                source: error.into(),
            })?;
        self.record(match decision {
            Decision::Keep => Outcome::Kept,
            Decision::Replace(_) => Outcome::Replaced,
            Decision::Drop => Outcome::Dropped,
        });
        Ok(decision)
    }

    pub(crate) fn record(&self, outcome: Outcome) {
        self.metrics.decision(self.filter.name(), outcome);
    }
}

// === impl Conn ===

impl Conn {
    async fn forward(&mut self) -> Result<(), Stop> {
        while let Some(chunk) = self.recv().await? {
            self.send(chunk).await?;
        }
        Ok(())
    }

    async fn list(&mut self, ctx: &ObjectFilterCtx<'_>) -> Result<(), Stop> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.recv().await? {
            body.extend_from_slice(&chunk);
        }
        let body = filter_list(ctx, body.freeze()).map_err(Stop::Failed)?;
        self.send(body).await
    }

    async fn watch(&mut self, ctx: &ObjectFilterCtx<'_>) -> Result<(), Stop> {
        let mut frames = LineFrames::default();
        let mut watch = WatchFilter::default();
        while let Some(chunk) = self.recv().await? {
            frames.push(&chunk);
            while let Some(frame) = frames.next_frame() {
                if let Some(event) = watch.on_frame(ctx, frame).map_err(Stop::Failed)? {
                    self.send(event).await?;
                }
            }
        }

        if let Some(frame) = frames.finish() {
            if let Some(event) = watch.on_frame(ctx, frame).map_err(Stop::Failed)? {
                self.send(event).await?;
            }
        }
        Ok(())
    }

    /// Reads the next upstream chunk, unless the caller disconnects or the proxy shuts down first.
    async fn recv(&mut self) -> Result<Option<Bytes>, Stop> {
        tokio::select! {
            biased;

            _ = self.downstream.closed() => Err(Stop::Disconnected),

            _ = &mut self.shutdown => Err(Stop::Shutdown),

            next = self.upstream.next() => match next {
                Some(Ok(chunk)) => Ok(Some(chunk)),
                Some(Err(error)) => Err(Stop::Failed(Error::Upstream(error))),
                None => Ok(None),
            },
        }
    }

    /// Writes a chunk downstream, waiting for capacity.
    async fn send(&mut self, chunk: Bytes) -> Result<(), Stop> {
        if chunk.is_empty() {
            return Ok(());
        }
        tokio::select! {
            biased;

            _ = &mut self.shutdown => Err(Stop::Shutdown),

            res = self.downstream.send(Ok(chunk)) => res.map_err(|_| Stop::Disconnected),
        }
    }

    /// Terminates the downstream body with an error so the caller observes a failed response.
    ///
    /// The stream is torn down immediately. A caller that is not reading has no room for the error
    /// and only sees the body end once it drains what was already buffered.
    fn fail(self, error: Arc<Error>) {
        if let Err(error) = self.downstream.try_send(Err(error)) {
            debug!(%error, "Caller could not be notified of the stream failure");
        }
    }
}
