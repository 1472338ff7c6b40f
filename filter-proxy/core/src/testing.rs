//! Filter managers with fixed behavior, for exercising consumers of [`FilterManager`].

use crate::{
    FilterManager, ObjectFilter, RequestDescriptor, Resolved, ResolvedObjectFilter,
    ResolvedResponseFilter,
};
use std::sync::Arc;

/// Resolves no filters and is always synced.
#[derive(Copy, Clone, Debug, Default)]
pub struct PassThrough;

/// Resolves the same object filter for every request and is always synced.
#[derive(Clone, Debug)]
pub struct FixedObjectFilter(ResolvedObjectFilter);

// === impl PassThrough ===

impl FilterManager for PassThrough {
    fn find_response_filter(&self, _: &RequestDescriptor) -> Option<ResolvedResponseFilter> {
        None
    }

    fn find_object_filter(&self, _: &RequestDescriptor) -> Option<ResolvedObjectFilter> {
        None
    }

    fn has_synced(&self) -> bool {
        true
    }
}

// === impl FixedObjectFilter ===

impl FixedObjectFilter {
    pub fn new(name: impl Into<Arc<str>>, filter: impl ObjectFilter + 'static) -> Self {
        let filter: Arc<dyn ObjectFilter> = Arc::new(filter);
        Self(Resolved::new(name.into(), filter))
    }
}

impl FilterManager for FixedObjectFilter {
    fn find_response_filter(&self, _: &RequestDescriptor) -> Option<ResolvedResponseFilter> {
        None
    }

    fn find_object_filter(&self, _: &RequestDescriptor) -> Option<ResolvedObjectFilter> {
        Some(self.0.clone())
    }

    fn has_synced(&self) -> bool {
        true
    }
}
