//! Reference-counted resource store.
//!
//! One critical section guards the whole map. Every mutation, including the
//! disposal that follows a release to zero, completes inside that section,
//! so no caller can observe an entry whose handle is already disposed.

use lumen_abstraction::{CacheKey, LocalHandle};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::types::{CacheEntry, CacheStats};

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<CacheKey, CacheEntry>,
    stats: CacheStats,
}

/// Mapping from cache key to a reference-counted local handle.
///
/// At most one entry exists per key, and an entry exists exactly while its
/// reference count is at least one.
#[derive(Debug, Default)]
pub struct ResourceStore {
    state: Mutex<StoreState>,
}

impl ResourceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a reference on an existing entry.
    ///
    /// # Returns
    /// The shared handle on a hit; `None` on a miss, with no side effect
    /// beyond statistics.
    pub fn acquire_existing(&self, key: &CacheKey) -> Option<LocalHandle> {
        let mut state = self.lock();
        let state = &mut *state;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.ref_count += 1;
            let handle = entry.handle.clone();
            let ref_count = entry.ref_count;
            state.stats.hits += 1;
            debug!(key = %key, ref_count, "Cache hit");
            Some(handle)
        } else {
            state.stats.misses += 1;
            debug!(key = %key, "Cache miss");
            None
        }
    }

    /// Insert a freshly fetched handle with a reference count of one.
    ///
    /// If an entry appeared for `key` since the caller's miss, the first
    /// insert wins: the existing entry gains a reference and the new handle
    /// is disposed immediately (unless it is the very same handle).
    ///
    /// # Returns
    /// The handle now stored under `key`, which callers must publish in
    /// place of the one they passed in.
    pub fn insert_new(&self, key: &CacheKey, handle: LocalHandle) -> LocalHandle {
        let mut state = self.lock();
        let state = &mut *state;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.ref_count += 1;
            state.stats.duplicate_inserts += 1;
            if !entry.handle.ptr_eq(&handle) && handle.dispose() {
                state.stats.disposals += 1;
            }
            debug!(
                key = %key,
                ref_count = entry.ref_count,
                kept_handle = entry.handle.id(),
                discarded_handle = handle.id(),
                "Entry already present, keeping first insert"
            );
            return entry.handle.clone();
        }

        state.entries.insert(key.clone(), CacheEntry::new(key.clone(), handle.clone()));
        state.stats.inserts += 1;
        state.stats.entries = state.entries.len();
        debug!(key = %key, handle = handle.id(), "Entry inserted");
        handle
    }

    /// Drop one reference on `key`.
    ///
    /// When the count reaches zero the entry is removed and its handle
    /// disposed before this call returns. Releasing a key with no entry is a
    /// no-op.
    ///
    /// # Returns
    /// `true` if this release disposed the entry.
    pub fn release(&self, key: &CacheKey) -> bool {
        let mut state = self.lock();
        let state = &mut *state;
        let Some(entry) = state.entries.get_mut(key) else {
            debug!(key = %key, "Release on absent key ignored");
            return false;
        };

        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            debug!(key = %key, ref_count = entry.ref_count, "Reference released");
            return false;
        }

        if let Some(entry) = state.entries.remove(key) {
            if entry.handle.dispose() {
                state.stats.disposals += 1;
            }
            debug!(key = %key, handle = entry.handle.id(), "Entry disposed");
        }
        state.stats.entries = state.entries.len();
        true
    }

    /// Dispose every handle and empty the store, regardless of reference counts.
    ///
    /// # Returns
    /// Number of entries removed.
    pub fn clear_all(&self) -> usize {
        let mut state = self.lock();
        let state = &mut *state;
        let cleared_count = state.entries.len();
        for (_, entry) in state.entries.drain() {
            if entry.handle.dispose() {
                state.stats.disposals += 1;
            }
        }
        state.stats.entries = 0;
        info!(cleared_count, "Cleared all resource entries");
        cleared_count
    }

    /// Current reference count for `key`, if an entry exists.
    #[must_use]
    pub fn ref_count(&self, key: &CacheKey) -> Option<usize> {
        self.lock().entries.get(key).map(|entry| entry.ref_count)
    }

    /// Returns `true` if an entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Keys of all current entries, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of the store statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut stats = state.stats.clone();
        stats.entries = state.entries.len();
        stats
    }
}
