//! Traversal statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one assembler.
#[derive(Debug)]
pub struct TraversalStats {
    /// Number of chunks read from the store
    chunks_read: AtomicU64,
    /// Number of aligned samples produced from those chunks
    samples_aligned: AtomicU64,
    /// Number of windows handed out
    windows_emitted: AtomicU64,
    /// Number of complete batches served
    batches_served: AtomicU64,
    /// Number of times the traversal restarted from the first building
    wraps: AtomicU64,
    /// When counting started
    started_at: DateTime<Utc>,
}

impl TraversalStats {
    /// Create zeroed counters, starting the clock now.
    pub fn new() -> Self {
        Self {
            chunks_read: AtomicU64::new(0),
            samples_aligned: AtomicU64::new(0),
            windows_emitted: AtomicU64::new(0),
            batches_served: AtomicU64::new(0),
            wraps: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// Record a chunk read from the store.
    pub fn record_chunk_read(&self) {
        self.chunks_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Record aligned samples produced from a chunk.
    pub fn record_samples_aligned(&self, count: u64) {
        self.samples_aligned.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a window handed to a batch.
    pub fn record_window_emitted(&self) {
        self.windows_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a complete batch returned to the caller.
    pub fn record_batch_served(&self) {
        self.batches_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a restart from the first building.
    pub fn record_wrap(&self) {
        self.wraps.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> TraversalSnapshot {
        TraversalSnapshot {
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            samples_aligned: self.samples_aligned.load(Ordering::Relaxed),
            windows_emitted: self.windows_emitted.load(Ordering::Relaxed),
            batches_served: self.batches_served.load(Ordering::Relaxed),
            wraps: self.wraps.load(Ordering::Relaxed),
            started_at: self.started_at,
            elapsed_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Traversal Statistics:\n\
             - Chunks read: {}\n\
             - Samples aligned: {}\n\
             - Windows emitted: {}\n\
             - Batches served: {}\n\
             - Wrap-arounds: {}\n\
             - Elapsed: {} seconds",
            stats.chunks_read,
            stats.samples_aligned,
            stats.windows_emitted,
            stats.batches_served,
            stats.wraps,
            stats.elapsed_secs
        )
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.chunks_read.store(0, Ordering::Relaxed);
        self.samples_aligned.store(0, Ordering::Relaxed);
        self.windows_emitted.store(0, Ordering::Relaxed);
        self.batches_served.store(0, Ordering::Relaxed);
        self.wraps.store(0, Ordering::Relaxed);
    }
}

impl Default for TraversalStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalSnapshot {
    pub chunks_read: u64,
    pub samples_aligned: u64,
    pub windows_emitted: u64,
    pub batches_served: u64,
    pub wraps: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: u64,
}

/// Thread-safe shared statistics.
pub type SharedTraversalStats = Arc<TraversalStats>;

/// Create new shared statistics.
pub fn create_shared_stats() -> SharedTraversalStats {
    Arc::new(TraversalStats::new())
}
