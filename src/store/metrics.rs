//! Store metrics for observability.
//!
//! Tracks statistics about node store operations for monitoring and
//! debugging. All counters are atomic for thread-safe access.

use std::sync::atomic::{AtomicU64, Ordering};

/// Node store metrics container.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Number of node body reads.
    pub node_reads: AtomicU64,
    /// Number of reads that found no body.
    pub read_misses: AtomicU64,
    /// Number of node body writes.
    pub node_writes: AtomicU64,
    /// Number of node body deletes.
    pub node_deletes: AtomicU64,
}

impl StoreMetrics {
    /// Creates a new metrics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read, hit or miss.
    pub fn record_read(&self, hit: bool) {
        self.node_reads.fetch_add(1, Ordering::Relaxed);
        if !hit {
            self.read_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a write.
    pub fn record_write(&self) {
        self.node_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a delete.
    pub fn record_delete(&self) {
        self.node_deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Total reads so far.
    pub fn reads(&self) -> u64 {
        self.node_reads.load(Ordering::Relaxed)
    }

    /// Reads that missed.
    pub fn misses(&self) -> u64 {
        self.read_misses.load(Ordering::Relaxed)
    }

    /// Total writes so far.
    pub fn writes(&self) -> u64 {
        self.node_writes.load(Ordering::Relaxed)
    }

    /// Total deletes so far.
    pub fn deletes(&self) -> u64 {
        self.node_deletes.load(Ordering::Relaxed)
    }
}

impl Clone for StoreMetrics {
    fn clone(&self) -> Self {
        Self {
            node_reads: AtomicU64::new(self.reads()),
            read_misses: AtomicU64::new(self.misses()),
            node_writes: AtomicU64::new(self.writes()),
            node_deletes: AtomicU64::new(self.deletes()),
        }
    }
}
