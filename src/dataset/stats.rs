//! Run-level statistics, shared across chunk workers.
//!
//! Counters only ever increase and every update is a single atomic
//! increment, so workers share one `Arc<RunStatistics>` with no locking.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters accumulated over one pipeline run.
#[derive(Debug, Default)]
pub struct RunStatistics {
    total_entities: AtomicU64,
    total_chunks: AtomicU64,
    chunks_attempted: AtomicU64,
    chunks_succeeded: AtomicU64,
    chunks_failed: AtomicU64,
    pairs_written: AtomicU64,
    total_entity_warnings: AtomicU64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_entities(&self, count: usize) {
        self.total_entities.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_chunks(&self, count: usize) {
        self.total_chunks.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn chunk_attempted(&self) {
        self.chunks_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_succeeded(&self) {
        self.chunks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_failed(&self) {
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pair_written(&self) {
        self.pairs_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity_warnings(&self, count: usize) {
        self.total_entity_warnings
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_entities: self.total_entities.load(Ordering::Relaxed),
            total_chunks: self.total_chunks.load(Ordering::Relaxed),
            chunks_attempted: self.chunks_attempted.load(Ordering::Relaxed),
            chunks_succeeded: self.chunks_succeeded.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            pairs_written: self.pairs_written.load(Ordering::Relaxed),
            total_entity_warnings: self.total_entity_warnings.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters, reported when the run finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_entities: u64,
    pub total_chunks: u64,
    pub chunks_attempted: u64,
    pub chunks_succeeded: u64,
    pub chunks_failed: u64,
    pub pairs_written: u64,
    pub total_entity_warnings: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  entities extracted:    {}", self.total_entities)?;
        writeln!(f, "  chunks total:          {}", self.total_chunks)?;
        writeln!(f, "  chunks attempted:      {}", self.chunks_attempted)?;
        writeln!(f, "  chunks succeeded:      {}", self.chunks_succeeded)?;
        writeln!(f, "  chunks failed:         {}", self.chunks_failed)?;
        writeln!(f, "  training pairs:        {}", self.pairs_written)?;
        write!(f, "  entity warnings:       {}", self.total_entity_warnings)
    }
}
