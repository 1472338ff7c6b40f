//! Streams filtered API responses to callers.
//!
//! The multiplexer sits between an upstream response body and the downstream body returned to a
//! caller. When an object filter applies, list bodies are decoded in full and watch bodies are
//! decoded event-by-event, and each object is passed through the filter before being re-encoded.
//! Watch streams track which objects the caller has seen so that an object that stops matching is
//! reported as deleted rather than silently disappearing.
//!
//! Each stream writes to a bounded channel: when the caller stops reading, the multiplexer stops
//! reading from upstream.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod frames;
mod list;
mod metrics;
mod serve;
mod watch;


pub use self::{
    metrics::StreamMetrics,
    serve::{Filters, Multiplexer},
};
use bytes::Bytes;
use edgehub_filter_core::BoxError;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The sending half of a downstream response body.
///
/// An error item indicates that the response failed and must not be treated as complete.
pub type Downstream = mpsc::Sender<Result<Bytes, Arc<Error>>>;

/// How a stream terminated.
#[derive(Clone, Debug)]
pub enum Status {
    /// The upstream body ended, or the proxy is shutting down.
    ClosedNormally,

    /// The stream was aborted because the upstream body could not be read, decoded, or filtered.
    UpstreamError(Arc<Error>),

    /// The caller stopped reading the response.
    DownstreamDisconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read upstream response: {0}")]
    Upstream(#[source] BoxError),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("filter {filter} failed: {source}")]
    Filter {
        filter: String,
        #[source]
        source: BoxError,
    },
}

// === impl Status ===

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClosedNormally => "closed",
            Self::UpstreamError(_) => "upstream_error",
            Self::DownstreamDisconnected => "downstream_disconnected",
        }
    }
}
