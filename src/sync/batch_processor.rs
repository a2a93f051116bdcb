//! Memory-bounded processing of a query's result set.
//!
//! Every item is transformed and applied independently: a failing item becomes an `error` detail
//! on the run and processing carries on with the next one. Large result sets are consumed in
//! chunks so the buffer can shrink as the batch progresses; chunking only changes how often
//! progress is reported, never the per-item outcomes.

use crate::sync::config::SyncConfig;
use crate::sync::history::SyncRun;
use crate::sync::progress_tracker::{BatchProgressTracker, BatchStats};
use crate::sync::reconcile::{ReconciliationApplier, RunContext};
use crate::sync::transformer::RecordTransformer;
use crate::sync::types::SyncError;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct BatchProcessor {
    transformer: Arc<RecordTransformer>,
    applier: Arc<dyn ReconciliationApplier>,
    config: SyncConfig,
}

impl BatchProcessor {
    pub fn new(
        transformer: Arc<RecordTransformer>,
        applier: Arc<dyn ReconciliationApplier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            transformer,
            applier,
            config,
        }
    }

    /// Whether `len` items would be processed chunk by chunk.
    pub fn uses_chunking(&self, len: usize) -> bool {
        self.config.memory_efficient_processing && len > self.chunk_size()
    }

    /// Chunk length; never zero so the chunked loop always makes progress.
    fn chunk_size(&self) -> usize {
        self.config.batch_size_threshold.max(1)
    }

    /// Process every item, appending one detail per item to `run`.
    ///
    /// Only run-state errors escape; item failures are recorded and counted.
    pub async fn process_all(
        &self,
        items: Vec<Value>,
        context: &RunContext,
        run: &mut SyncRun,
    ) -> Result<BatchStats, SyncError> {
        if self.uses_chunking(items.len()) {
            self.process_chunked(items, context, run).await
        } else {
            self.process_single_pass(items, context, run).await
        }
    }

    async fn process_single_pass(
        &self,
        items: Vec<Value>,
        context: &RunContext,
        run: &mut SyncRun,
    ) -> Result<BatchStats, SyncError> {
        let total = items.len();
        let mut tracker = BatchProgressTracker::new(total, total.max(1), 1, 1);

        for (index, item) in items.iter().enumerate() {
            self.process_item(item, index, context, run, &mut tracker)
                .await?;
        }
        if total > 0 {
            tracker.complete_chunk();
        }

        let stats = tracker.get_stats();
        debug!("Query {}: {}", context.query_name, stats.summary());
        Ok(stats)
    }

    async fn process_chunked(
        &self,
        mut items: Vec<Value>,
        context: &RunContext,
        run: &mut SyncRun,
    ) -> Result<BatchStats, SyncError> {
        let total = items.len();
        let chunk_size = self.chunk_size();
        let mut tracker = BatchProgressTracker::new(
            total,
            chunk_size,
            self.config.progress_interval_chunks,
            self.config.memory_release_interval_chunks,
        );

        debug!(
            "Query {}: processing {} items in {} chunks of {}",
            context.query_name,
            total,
            tracker.total_chunks(),
            chunk_size
        );

        // Chunks are split off the tail, so keep the buffer reversed.
        items.reverse();
        let mut index = 0;

        while !items.is_empty() {
            let split_at = items.len().saturating_sub(chunk_size);
            let mut chunk = items.split_off(split_at);
            chunk.reverse();

            for item in &chunk {
                self.process_item(item, index, context, run, &mut tracker)
                    .await?;
                index += 1;
            }
            drop(chunk);

            let milestones = tracker.complete_chunk();
            if milestones.release_due {
                items.shrink_to_fit();
                tracker.record_release();
                debug!(
                    "Query {}: released buffer, {} items remain (capacity {})",
                    context.query_name,
                    items.len(),
                    items.capacity()
                );
            }
            if milestones.progress_due && self.config.progress_logging {
                tracker.log_progress(&context.query_name);
                run.record_success(
                    format!("progress {}", context.query_name),
                    tracker.progress_message(),
                )?;
            }
        }

        let stats = tracker.get_stats();
        debug!("Query {}: {}", context.query_name, stats.summary());
        Ok(stats)
    }

    async fn process_item(
        &self,
        item: &Value,
        index: usize,
        context: &RunContext,
        run: &mut SyncRun,
        tracker: &mut BatchProgressTracker,
    ) -> Result<(), SyncError> {
        let label = format!("item {}", item_key(item, index));

        match self.apply_item(item, context).await {
            Ok(record) => {
                tracker.record_success();
                run.record_success(label, record.to_string())?;
            }
            Err(e) => {
                warn!(
                    "Query {}: {} failed: {}",
                    context.query_name, label, e
                );
                tracker.record_failure();
                run.record_error(label, e.to_string())?;
            }
        }
        Ok(())
    }

    async fn apply_item(&self, item: &Value, context: &RunContext) -> Result<Value, SyncError> {
        let record = self
            .transformer
            .transform(item, &context.template_id)
            .await?;
        self.applier.apply_changes(&record, context).await?;
        Ok(record)
    }
}

/// Stable label for an issue: its `key`, else its `id`, else its position.
fn item_key(item: &Value, index: usize) -> String {
    match (item.get("key"), item.get("id")) {
        (Some(Value::String(key)), _) => key.clone(),
        (_, Some(Value::String(id))) => id.clone(),
        (_, Some(Value::Number(id))) => id.to_string(),
        _ => format!("#{}", index + 1),
    }
}
