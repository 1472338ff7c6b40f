//! Filter selection for the edge hub proxy.
//!
//! Requests that pass through the proxy are described by a [`RequestDescriptor`]. Filters are
//! registered in a [`Registry`] alongside a [`Predicate`] that determines which descriptors they
//! apply to. A [`FilterManager`] resolves, for each request, at most one response filter (which
//! rewrites an entire response body) and at most one object filter (which inspects each object of
//! a list or watch response):
//!
//! ```text
//! [ RequestDescriptor ] -> [ FilterManager ] -> [ Registry ] -> ( ResponseFilter | ObjectFilter )
//! ```
//!
//! Filters may depend on caches that must be populated before their decisions are authoritative.
//! Each such cache exposes a [`SyncSignal`]; a manager reports [`FilterManager::has_synced`] only
//! once every signal its filters depend on has fired.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod descriptor;
mod filter;
mod manager;
mod predicate;
mod registry;
mod sync;
pub mod testing;


pub use self::{
    descriptor::{RequestDescriptor, Verb},
    filter::{
        BoxError, ByteStream, Decision, Filter, ObjectFilter, Resolved, ResolvedObjectFilter,
        ResolvedResponseFilter, ResponseFilter,
    },
    manager::{FilterManager, Manager},
    predicate::{Match, Predicate},
    registry::Registry,
    sync::SyncSignal,
};
pub use edgehub_k8s_api::{DynamicObject, GroupResource};

/// Indicates that the proxy's filters are misconfigured. These errors are only produced while
/// filters are being installed and are fatal to startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("filter {0} is already registered")]
    DuplicateName(String),

    #[error("filter {filter} has an invalid predicate: {reason}")]
    InvalidPredicate { filter: String, reason: String },

    #[error("failed to parse predicate {input:?}: {reason}")]
    ParsePredicate { input: String, reason: String },

    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
}
