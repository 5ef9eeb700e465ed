//! Store Metrics
//!
//! Operational counters for a cache store. Contained connectivity failures
//! look exactly like misses to callers, so these counters are the only place
//! the difference stays visible.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Store metrics collector
#[derive(Debug, Default)]
pub struct StoreMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    failed_writes: AtomicU64,
    deletes: AtomicU64,
    computes: AtomicU64,
    connectivity_errors: AtomicU64,
}

impl StoreMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self, stored: bool) {
        if stored {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compute(&self) {
        self.computes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connectivity_error(&self) {
        self.connectivity_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn computes(&self) -> u64 {
        self.computes.load(Ordering::Relaxed)
    }

    pub fn connectivity_errors(&self) -> u64 {
        self.connectivity_errors.load(Ordering::Relaxed)
    }

    /// Hit ratio over all reads
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            writes: self.writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            computes: self.computes(),
            connectivity_errors: self.connectivity_errors(),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.failed_writes.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.computes.store(0, Ordering::Relaxed);
        self.connectivity_errors.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of store metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub writes: u64,
    pub failed_writes: u64,
    pub deletes: u64,
    pub computes: u64,
    pub connectivity_errors: u64,
}

// =============================================================================
// Tests
// =============================================================================
