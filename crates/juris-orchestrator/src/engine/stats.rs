//! Per-worker request counters.
//!
//! Observability only. Lost on restart; nothing reads them for decisions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic request counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    busy: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    /// Requests answered from the cache.
    pub cache_hits: u64,
    /// Requests that missed the cache (or bypassed it).
    pub cache_misses: u64,
    /// Requests answered with a busy outcome.
    pub busy: u64,
    /// Successful model computations.
    pub computations: u64,
    /// Requests that ended in an error.
    pub failures: u64,
}

impl EngineStats {
    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_busy(&self) {
        self.busy.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_computation(&self) {
        self.computations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl EngineStatsSnapshot {
    /// Hits over all cache lookups, 0.0 when there were none.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 { 0.0 } else { self.cache_hits as f64 / lookups as f64 }
    }
}
