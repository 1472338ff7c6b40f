use crate::{
    ConfigError, Filter, Predicate, RequestDescriptor, ResolvedObjectFilter,
    ResolvedResponseFilter, SyncSignal,
};
use tracing::debug;

/// Holds installed filters in registration order.
///
/// The registry is populated at startup and is not modified while requests are being served.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

#[derive(Clone, Debug)]
struct Entry {
    filter: Filter,
    predicate: Predicate,
}

// === impl Registry ===

impl Registry {
    /// Installs a filter.
    ///
    /// Fails if a filter with the same name is already registered or if the predicate cannot be
    /// used with the filter's capabilities.
    pub fn register(&mut self, filter: Filter, predicate: Predicate) -> Result<(), ConfigError> {
        if self.entries.iter().any(|e| e.filter.name() == filter.name()) {
            return Err(ConfigError::DuplicateName(filter.name().to_string()));
        }
        predicate.validate(&filter)?;

        debug!(
            filter = %filter.name(),
            %predicate,
            response = filter.has_response_filter(),
            object = filter.has_object_filter(),
            "Registered",
        );
        self.entries.push(Entry { filter, predicate });
        Ok(())
    }

    /// Returns the response filters that apply to a request, in registration order.
    pub fn match_response_filters<'r>(
        &'r self,
        req: &'r RequestDescriptor,
    ) -> impl Iterator<Item = ResolvedResponseFilter> + 'r {
        self.matching(req).filter_map(Filter::response_filter)
    }

    /// Returns the object filters that apply to a request, in registration order.
    pub fn match_object_filters<'r>(
        &'r self,
        req: &'r RequestDescriptor,
    ) -> impl Iterator<Item = ResolvedObjectFilter> + 'r {
        self.matching(req).filter_map(Filter::object_filter)
    }

    /// Returns the sync signals of all registered filters.
    pub fn dependencies(&self) -> impl Iterator<Item = &SyncSignal> {
        self.entries.iter().flat_map(|e| e.filter.dependencies())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.filter.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching<'r>(&'r self, req: &'r RequestDescriptor) -> impl Iterator<Item = &'r Filter> + 'r {
        self.entries
            .iter()
            .filter(move |e| e.predicate.matches(req))
            .map(|e| &e.filter)
    }
}
