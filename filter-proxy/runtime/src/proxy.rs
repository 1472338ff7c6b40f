use crate::{
    core::{BoxError, ByteStream, FilterManager},
    mux::{Filters, Multiplexer},
    request_info,
};
use anyhow::Result;
use bytes::Bytes;
use futures::{future, prelude::*};
use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use hyper::body::{Body as HttpBody, Frame};
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use std::{
    convert::Infallible,
    net::SocketAddr,
    task::{Context, Poll},
};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, info_span, instrument, trace, warn, Instrument};

pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// Forwards API requests through the cluster client, filtering responses.
#[derive(Clone)]
pub struct Proxy<M> {
    client: kube::Client,
    manager: M,
    mux: Multiplexer,
    stream_buffer: usize,
}

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [header::HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

// === impl Proxy ===

impl<M> Proxy<M>
where
    M: FilterManager + Clone + 'static,
{
    pub fn new(client: kube::Client, manager: M, mux: Multiplexer, stream_buffer: usize) -> Self {
        Self {
            client,
            manager,
            mux,
            stream_buffer: stream_buffer.max(1),
        }
    }

    async fn proxy<B>(self, req: Request<B>) -> Response<Body>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let desc = request_info::describe(&parts);
        trace!(%desc, caller = ?desc.caller, "Proxying");

        // Responses must not be served until filters can make authoritative decisions.
        if !self.manager.has_synced() {
            debug!(%desc, "Filters are not yet synced");
            let mut rsp = text_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "filters are not yet synced",
            );
            rsp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            return rsp;
        }

        let filters = Filters::resolve(&self.manager, &desc);
        let body = match body.collect().await {
            Ok(body) => body.to_bytes(),
            Err(error) => {
                let error: BoxError = error.into();
                debug!(%error, "Failed to read request body");
                return text_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut upstream = Request::builder()
            .method(parts.method.clone())
            .uri(path)
            .body(kube::client::Body::from(body))
            .expect("upstream request must be valid");
        *upstream.headers_mut() = forwarded_headers(&parts.headers);
        upstream.headers_mut().remove(header::HOST);
        upstream.headers_mut().remove(header::AUTHORIZATION);
        upstream.headers_mut().remove(header::CONTENT_LENGTH);
        let decodes_objects = filters.decodes_objects(&desc);
        if decodes_objects {
            // Objects can only be inspected in their uncompressed JSON encoding.
            upstream
                .headers_mut()
                .insert(header::ACCEPT, HeaderValue::from_static("application/json"));
            upstream.headers_mut().remove(header::ACCEPT_ENCODING);
        }

        let rsp = match self.client.send(upstream).await {
            Ok(rsp) => rsp,
            Err(error) => {
                warn!(%desc, %error, "Upstream request failed");
                return text_response(StatusCode::BAD_GATEWAY, "upstream request failed");
            }
        };

        let (mut rsp_parts, rsp_body) = rsp.into_parts();
        rsp_parts.headers = forwarded_headers(&rsp_parts.headers);

        // Error responses are passed through as-is.
        let filters = if rsp_parts.status.is_success() {
            filters
        } else {
            Filters::default()
        };
        if decodes_objects && rsp_parts.status.is_success() {
            if let Some(encoding) = rsp_parts.headers.remove(header::CONTENT_ENCODING) {
                if encoding != "identity" {
                    warn!(%desc, ?encoding, "Upstream response is encoded and cannot be filtered");
                    return text_response(StatusCode::BAD_GATEWAY, "upstream response is encoded");
                }
            }
        }
        if !filters.is_empty() {
            rsp_parts.headers.remove(header::CONTENT_LENGTH);
        }

        let upstream: ByteStream = Box::pin(
            rsp_body
                .into_data_stream()
                .map_err(|error| -> BoxError { error.into() }),
        );
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        self.mux.spawn(desc, filters, upstream, tx);

        let body = StreamBody::new(
            ReceiverStream::new(rx)
                .map_ok(Frame::data)
                .map_err(|error| -> BoxError { Box::new(error) }),
        );
        Response::from_parts(rsp_parts, body.boxed_unsync())
    }
}

impl<M, B> tower::Service<Request<B>> for Proxy<M>
where
    M: FilterManager + Clone + 'static,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        Box::pin(self.clone().proxy(req).map(Ok))
    }
}

/// Accepts connections until the proxy begins shutting down.
#[instrument(skip_all, fields(%addr))]
pub async fn serve<M>(addr: SocketAddr, proxy: Proxy<M>, drain: drain::Watch) -> Result<()>
where
    M: FilterManager + Clone + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Filter proxy listening");

    let shutdown = drain.clone().signaled();
    tokio::pin!(shutdown);
    loop {
        let (io, client_addr) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => {
                debug!("Shutting down");
                return Ok(());
            }
        };

        tokio::spawn(
            serve_conn(io, proxy.clone(), drain.clone())
                .instrument(info_span!("conn", client.addr = %client_addr)),
        );
    }
}

async fn serve_conn<M>(io: tokio::net::TcpStream, proxy: Proxy<M>, drain: drain::Watch)
where
    M: FilterManager + Clone + 'static,
{
    let conn = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(proxy));
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        release = drain.signaled() => {
            conn.as_mut().graceful_shutdown();
            release.release_after(conn).await
        }
    };
    if let Err(error) = res {
        debug!(%error, "Connection failed");
    }
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

fn text_response(status: StatusCode, msg: &'static str) -> Response<Body> {
    let body = Full::new(Bytes::from_static(msg.as_bytes()))
        .map_err(|never| match never {})
        .boxed_unsync();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(body)
        .expect("response must be valid")
}
