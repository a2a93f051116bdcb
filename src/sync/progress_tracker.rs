//! Progress tracking for batch processing.
//!
//! `BatchProgressTracker` counts chunks and item outcomes while the batch processor works through
//! a query's result set, and decides when a progress report or a memory-release pass is due.

use tracing::info;

/// What is due after a chunk completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkMilestones {
    /// A progress report should be emitted.
    pub progress_due: bool,
    /// Buffer capacity should be released.
    pub release_due: bool,
}

/// Service for tracking batch progress
#[derive(Debug, Clone)]
pub struct BatchProgressTracker {
    /// Items in the whole batch
    total_items: usize,
    /// Items per chunk
    chunk_size: usize,
    chunks_processed: usize,
    successes: usize,
    failures: usize,
    /// Buffer releases performed so far
    memory_releases: usize,
    /// Report progress every N chunks
    progress_interval: usize,
    /// Release memory every M chunks
    release_interval: usize,
    /// Chunk at which progress was last reported
    last_reported_chunk: usize,
}

impl BatchProgressTracker {
    pub fn new(
        total_items: usize,
        chunk_size: usize,
        progress_interval: usize,
        release_interval: usize,
    ) -> Self {
        Self {
            total_items,
            chunk_size: chunk_size.max(1),
            chunks_processed: 0,
            successes: 0,
            failures: 0,
            memory_releases: 0,
            progress_interval: progress_interval.max(1),
            release_interval: release_interval.max(1),
            last_reported_chunk: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Count a buffer release performed after a due milestone.
    pub fn record_release(&mut self) {
        self.memory_releases += 1;
    }

    /// Mark one chunk as done and report which milestones it reached.
    pub fn complete_chunk(&mut self) -> ChunkMilestones {
        self.chunks_processed += 1;

        let is_last = self.chunks_processed >= self.total_chunks();
        let progress_due = self.chunks_processed % self.progress_interval == 0
            || (is_last && self.last_reported_chunk < self.chunks_processed);
        if progress_due {
            self.last_reported_chunk = self.chunks_processed;
        }

        ChunkMilestones {
            progress_due,
            release_due: self.chunks_processed % self.release_interval == 0,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.total_items.div_ceil(self.chunk_size)
    }

    pub fn items_processed(&self) -> usize {
        self.successes + self.failures
    }

    /// Log a progress line.
    pub fn log_progress(&self, label: &str) {
        info!(
            "{}: chunk {}/{}, {}/{} items processed ({} failed)",
            label,
            self.chunks_processed,
            self.total_chunks(),
            self.items_processed(),
            self.total_items,
            self.failures
        );
    }

    /// Text for a progress audit detail.
    pub fn progress_message(&self) -> String {
        format!(
            "chunk {}/{}: {}/{} items processed, {} failed",
            self.chunks_processed,
            self.total_chunks(),
            self.items_processed(),
            self.total_items,
            self.failures
        )
    }

    pub fn get_stats(&self) -> BatchStats {
        BatchStats {
            total_items: self.total_items,
            chunks_processed: self.chunks_processed,
            successes: self.successes,
            failures: self.failures,
            memory_releases: self.memory_releases,
        }
    }
}

/// Statistics about one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total_items: usize,
    pub chunks_processed: usize,
    pub successes: usize,
    pub failures: usize,
    pub memory_releases: usize,
}

impl BatchStats {
    /// Get a human-readable summary of the batch statistics
    pub fn summary(&self) -> String {
        format!(
            "{} items in {} chunk(s): {} succeeded{}",
            self.total_items,
            self.chunks_processed,
            self.successes,
            if self.failures == 0 {
                String::new()
            } else {
                format!(", {} failed", self.failures)
            }
        )
    }
}
