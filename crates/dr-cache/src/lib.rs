//! Content-addressed render cache for dr.
//!
//! This crate decouples the render manager from the storage of previously
//! rendered diagrams:
//!
//! - [`CacheKey`]: deterministic hash of (format, source, theme, options)
//! - [`CacheStore`]: key-value store of [`CacheEntry`]s with TTL expiry and
//!   hit/miss accounting
//!
//! # Implementations
//!
//! - [`NullCache`]: No-op implementation (always misses)
//! - [`FileCache`]: Persistent file-based implementation with atomic writes
//!   and version validation
//!
//! A broken cache never breaks rendering: implementations swallow I/O errors
//! and report a miss instead.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dr_cache::{CacheEntry, CacheKey, CacheStore, ContentKind, NullCache};
//!
//! let key = CacheKey { source: "graph TD; A-->B", format: "svg", theme: None, options: None };
//! let hash = key.compute_hash();
//!
//! let cache = NullCache::default();
//! cache.put(&CacheEntry::new(&hash, "svg", ContentKind::Text, b"<svg/>".to_vec(), Duration::from_secs(60)));
//! assert!(cache.get(&hash).is_none()); // NullCache always misses
//! ```

mod entry;
mod file;
mod key;
mod stats;

pub use entry::{CacheEntry, ContentKind};
pub use file::FileCache;
pub use key::{CacheKey, canonical_json, canonical_options};
pub use stats::{CacheCounters, CacheStats};

/// Persistent store of rendered diagrams.
///
/// Implementations must be thread-safe: one store is shared by every
/// concurrent render in a process.
pub trait CacheStore: Send + Sync {
    /// Retrieve a live entry.
    ///
    /// Returns `None` on a miss, on an expired entry (which is deleted), or on
    /// any I/O error. Every call counts as exactly one hit or one miss.
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store an entry, replacing any existing entry for the same key.
    fn put(&self, entry: &CacheEntry);

    /// Delete one entry. Returns whether it existed.
    fn remove(&self, key: &str) -> bool;

    /// Delete every entry and reset the hit/miss counters.
    ///
    /// Returns the number of entries removed.
    fn clear(&self) -> usize;

    /// Delete entries whose TTL has elapsed. Returns the number removed.
    fn cleanup_expired(&self) -> usize;

    /// Current statistics.
    fn stats(&self) -> CacheStats;
}

/// No-op [`CacheStore`] that never stores data.
///
/// Every `get` is a miss (and counted as one); every `put` is discarded.
/// Use when caching is disabled.
#[derive(Debug, Default)]
pub struct NullCache {
    counters: CacheCounters,
}

impl CacheStore for NullCache {
    fn get(&self, _key: &str) -> Option<CacheEntry> {
        self.counters.record_miss();
        None
    }

    fn put(&self, _entry: &CacheEntry) {}

    fn remove(&self, _key: &str) -> bool {
        false
    }

    fn clear(&self) -> usize {
        self.counters.reset();
        0
    }

    fn cleanup_expired(&self) -> usize {
        0
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_null_cache_always_misses() {
        let cache = NullCache::default();

        assert_eq!(cache.get("key"), None);

        cache.put(&CacheEntry::new(
            "key",
            "svg",
            ContentKind::Text,
            b"hello".to_vec(),
            Duration::from_secs(60),
        ));
        assert_eq!(cache.get("key"), None);

        let stats = cache.stats();
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.total_files, 0);
        assert_eq!(cache.clear(), 0);
    }
}
