use crate::{
    ConfigError, Filter, Predicate, Registry, RequestDescriptor, ResolvedObjectFilter,
    ResolvedResponseFilter, SyncSignal,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{info, trace};

/// Resolves the filters that apply to a request.
///
/// Resolution never fails: most requests have no applicable filter. Callers should not resolve
/// filters until [`FilterManager::has_synced`] returns true, though doing so is harmless.
pub trait FilterManager: Send + Sync {
    fn find_response_filter(&self, req: &RequestDescriptor) -> Option<ResolvedResponseFilter>;

    fn find_object_filter(&self, req: &RequestDescriptor) -> Option<ResolvedObjectFilter>;

    /// Indicates whether all caches that filters depend on have completed their initial sync.
    /// Once true, remains true.
    fn has_synced(&self) -> bool;
}

/// A [`FilterManager`] backed by a [`Registry`].
///
/// Clones share the registry and readiness state.
#[derive(Clone, Debug)]
pub struct Manager {
    registry: Arc<Registry>,
    dependencies: Arc<[SyncSignal]>,
    synced: Arc<AtomicBool>,
}

// === impl Manager ===

impl Manager {
    pub fn new(registry: Registry) -> Self {
        let dependencies = registry.dependencies().cloned().collect::<Vec<_>>();
        Self {
            registry: Arc::new(registry),
            dependencies: dependencies.into(),
            synced: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds a manager from filters in registration order.
    pub fn from_filters(
        filters: impl IntoIterator<Item = (Filter, Predicate)>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Registry::default();
        for (filter, predicate) in filters {
            registry.register(filter, predicate)?;
        }
        Ok(Self::new(registry))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl FilterManager for Manager {
    fn find_response_filter(&self, req: &RequestDescriptor) -> Option<ResolvedResponseFilter> {
        let filter = self.registry.match_response_filters(req).next();
        trace!(%req, filter = ?filter.as_ref().map(|f| f.name()), "Resolved response filter");
        filter
    }

    fn find_object_filter(&self, req: &RequestDescriptor) -> Option<ResolvedObjectFilter> {
        let filter = self.registry.match_object_filters(req).next();
        trace!(%req, filter = ?filter.as_ref().map(|f| f.name()), "Resolved object filter");
        filter
    }

    fn has_synced(&self) -> bool {
        if self.synced.load(Ordering::Acquire) {
            return true;
        }

        if !self.dependencies.iter().all(SyncSignal::is_synced) {
            return false;
        }

        if !self.synced.swap(true, Ordering::AcqRel) {
            info!(filters = self.registry.len(), "Filters synced");
        }
        true
    }
}

impl<M: FilterManager + ?Sized> FilterManager for Arc<M> {
    fn find_response_filter(&self, req: &RequestDescriptor) -> Option<ResolvedResponseFilter> {
        (**self).find_response_filter(req)
    }

    fn find_object_filter(&self, req: &RequestDescriptor) -> Option<ResolvedObjectFilter> {
        (**self).find_object_filter(req)
    }

    fn has_synced(&self) -> bool {
        (**self).has_synced()
    }
}
