//! Hit/miss bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// `hits / (hits + misses)`, 0 when there were no lookups.
    pub hit_rate: f64,
    /// Number of stored entries (expired ones included until evicted).
    pub total_files: u64,
    pub total_size_bytes: u64,
}

/// Lock-free hit/miss counters shared by cache implementations.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Build a [`CacheStats`] from the counters and storage totals.
    #[must_use]
    pub fn snapshot(&self, total_files: u64, total_size_bytes: u64) -> CacheStats {
        let cache_hits = self.hits.load(Ordering::Relaxed);
        let cache_misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            cache_hits,
            cache_misses,
            hit_rate: hit_rate(cache_hits, cache_misses),
            total_files,
            total_size_bytes,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
