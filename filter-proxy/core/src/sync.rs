use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Signals that a cache has completed its first full synchronization.
///
/// A signal starts unsynced and may be marked exactly once; it never reverts. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct SyncSignal(Arc<AtomicBool>);

// === impl SyncSignal ===

impl SyncSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the cache as synced. Returns true only for the call that changed the state.
    pub fn mark_synced(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_synced(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
