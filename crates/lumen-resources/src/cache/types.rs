//! Core data types for the resource store.

use lumen_abstraction::{CacheKey, LocalHandle};
use serde::Serialize;
use std::time::Instant;

/// A reference-counted store entry.
///
/// Exists only while `ref_count >= 1`; the store removes it and disposes its
/// handle on the transition to zero.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Canonical key of the resource.
    pub key: CacheKey,
    /// The shared local handle.
    pub handle: LocalHandle,
    /// Number of consumers holding a reference.
    pub ref_count: usize,
    /// Timestamp when the entry was inserted.
    pub created_at: Instant,
}

impl CacheEntry {
    /// Create a new entry with a single reference.
    pub fn new(key: CacheKey, handle: LocalHandle) -> Self {
        Self {
            key,
            handle,
            ref_count: 1,
            created_at: Instant::now(),
        }
    }
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// `acquire_existing` calls that found an entry.
    pub hits: u64,
    /// `acquire_existing` calls that found nothing.
    pub misses: u64,
    /// Entries created by `insert_new`.
    pub inserts: u64,
    /// `insert_new` calls that found an entry already present.
    pub duplicate_inserts: u64,
    /// Handles disposed by the store (release to zero, tie-breaks, clear).
    pub disposals: u64,
    /// Current number of entries.
    pub entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_cache_entry_starts_with_one_reference() {
        let handle = LocalHandle::new(Bytes::from_static(b"x"), "text/plain");
        let entry = CacheEntry::new(CacheKey::new("/r/1"), handle.clone());

        assert_eq!(entry.ref_count, 1);
        assert_eq!(entry.handle, handle);
        assert_eq!(entry.key.as_str(), "/r/1");
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.inserts, 0);
        assert_eq!(stats.duplicate_inserts, 0);
        assert_eq!(stats.disposals, 0);
        assert_eq!(stats.entries, 0);
    }
}
