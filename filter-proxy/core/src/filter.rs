use crate::{RequestDescriptor, SyncSignal};
use bytes::Bytes;
use edgehub_k8s_api::{DynamicObject, GroupResource};
use futures::prelude::*;
use std::{fmt, ops::Deref, pin::Pin, sync::Arc};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A response body, as a stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send + 'static>>;

/// Transforms an entire response body as an opaque stream.
pub trait ResponseFilter: Send + Sync {
    fn filter(&self, request: &RequestDescriptor, body: ByteStream) -> ByteStream;
}

/// Inspects a single object from a list or watch response.
///
/// Implementations must not modify the object they are given. A changed object is returned as a
/// [`Decision::Replace`] copy so that unchanged objects may be forwarded without re-encoding.
pub trait ObjectFilter: Send + Sync {
    fn filter(&self, resource: &GroupResource, obj: &DynamicObject) -> anyhow::Result<Decision>;
}

/// The outcome of applying an [`ObjectFilter`] to an object.
#[derive(Clone, Debug)]
pub enum Decision {
    /// Forward the object unchanged.
    Keep,

    /// Forward the given object in place of the original.
    Replace(DynamicObject),

    /// Withhold the object from the caller.
    Drop,
}

/// A named filter and the capabilities it provides.
///
/// A filter's capabilities are fixed when it is constructed; a filter may provide either, both, or
/// (uselessly) neither.
#[derive(Clone)]
pub struct Filter {
    name: Arc<str>,
    response: Option<Arc<dyn ResponseFilter>>,
    object: Option<Arc<dyn ObjectFilter>>,

    /// Caches that must complete their initial sync before this filter's decisions are valid.
    dependencies: Vec<SyncSignal>,
}

/// A filter capability resolved for a request, along with the name of the filter that provided it.
pub struct Resolved<F: ?Sized> {
    name: Arc<str>,
    filter: Arc<F>,
}

pub type ResolvedResponseFilter = Resolved<dyn ResponseFilter>;
pub type ResolvedObjectFilter = Resolved<dyn ObjectFilter>;

// === impl Filter ===

impl Filter {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            response: None,
            object: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_response_filter(mut self, filter: impl ResponseFilter + 'static) -> Self {
        self.response = Some(Arc::new(filter));
        self
    }

    pub fn with_object_filter(mut self, filter: impl ObjectFilter + 'static) -> Self {
        self.object = Some(Arc::new(filter));
        self
    }

    /// Gates the filter on the initial sync of a cache.
    pub fn depends_on(mut self, signal: SyncSignal) -> Self {
        self.dependencies.push(signal);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_response_filter(&self) -> bool {
        self.response.is_some()
    }

    pub fn has_object_filter(&self) -> bool {
        self.object.is_some()
    }

    pub fn dependencies(&self) -> &[SyncSignal] {
        &self.dependencies
    }

    pub(crate) fn response_filter(&self) -> Option<ResolvedResponseFilter> {
        let filter = self.response.clone()?;
        Some(Resolved::new(self.name.clone(), filter))
    }

    pub(crate) fn object_filter(&self) -> Option<ResolvedObjectFilter> {
        let filter = self.object.clone()?;
        Some(Resolved::new(self.name.clone(), filter))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("response", &self.response.is_some())
            .field("object", &self.object.is_some())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

// === impl Resolved ===

impl<F: ?Sized> Resolved<F> {
    pub(crate) fn new(name: Arc<str>, filter: Arc<F>) -> Self {
        Self { name, filter }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<F: ?Sized> Clone for Resolved<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<F: ?Sized> Deref for Resolved<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.filter
    }
}

impl<F: ?Sized> fmt::Debug for Resolved<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolved").field(&self.name).finish()
    }
}
