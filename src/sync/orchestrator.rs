//! Sync orchestrator and integration point for all sync services.
//!
//! This module defines the `SyncOrchestrator`, which executes the operator-defined queries in
//! priority order and builds the run's audit trail. For every query it pages through the tracker
//! (through the retry engine), hands the fetched issues to the batch processor, and records the
//! outcome on the `SyncRun`.
//!
//! Failure boundaries:
//! - item failures are recorded by the batch processor and never leave it
//! - query failures are recorded as an `execute query <name>` error and the next query runs
//! - anything escaping the per-query boundary (e.g. the run repository failing) fails the run
//!   with a `sync error` detail
//!
//! The run ends `Failed` if any detail is an error, `Completed` otherwise.

use crate::sync::batch_processor::BatchProcessor;
use crate::sync::classifier::FailureClassifier;
use crate::sync::config::SyncConfig;
use crate::sync::history::{RunKind, SyncRun};
use crate::sync::notifications::NotificationDispatcher;
use crate::sync::pagination::PaginatedFetcher;
use crate::sync::progress_tracker::BatchStats;
use crate::sync::reconcile::{ReconciliationApplier, RunContext};
use crate::sync::repositories::{QueryProvider, SyncQuery, SyncRunRepository, TemplateRepository};
use crate::sync::retry::RetryEngine;
use crate::sync::transformer::{RecordTransformer, TransformationEngine};
use crate::sync::types::{FetchFailure, SyncError};
use crate::tracker::IssueSearch;
use crate::utils::format_rate;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// External collaborators the orchestrator is wired to
#[derive(Clone)]
pub struct SyncCollaborators {
    pub search: Arc<dyn IssueSearch>,
    pub queries: Arc<dyn QueryProvider>,
    pub templates: Arc<dyn TemplateRepository>,
    pub engine: Arc<dyn TransformationEngine>,
    pub applier: Arc<dyn ReconciliationApplier>,
    pub runs: Arc<dyn SyncRunRepository>,
    pub notifier: NotificationDispatcher,
}

/// What happened to one query
#[derive(Debug, Default)]
struct QueryReport {
    pages: usize,
    total: u64,
    stats: BatchStats,
    /// Page fetch failure after the retry engine gave up.
    error: Option<FetchFailure>,
}

/// Main sync orchestrator that coordinates all sync components.
pub struct SyncOrchestrator {
    config: SyncConfig,
    queries: Arc<dyn QueryProvider>,
    runs: Arc<dyn SyncRunRepository>,
    transformer: Arc<RecordTransformer>,
    fetcher: PaginatedFetcher,
    processor: BatchProcessor,
}

impl SyncOrchestrator {
    /// Create a new orchestrator, wiring the retry engine, fetcher and batch processor.
    pub fn new(config: SyncConfig, collaborators: SyncCollaborators) -> Self {
        let classifier = FailureClassifier::new(config.rate_limit_default_wait);
        let retry = RetryEngine::new(config.retry.clone(), classifier, collaborators.notifier);
        let fetcher = PaginatedFetcher::new(collaborators.search, retry, config.page_size);

        let transformer = Arc::new(RecordTransformer::new(
            collaborators.templates,
            collaborators.engine,
        ));
        let processor =
            BatchProcessor::new(transformer.clone(), collaborators.applier, config.clone());

        Self {
            config,
            queries: collaborators.queries,
            runs: collaborators.runs,
            transformer,
            fetcher,
            processor,
        }
    }

    /// Execute one run across all active queries.
    ///
    /// Always returns the finished run; its status and details are the only outcome signal.
    pub async fn run(&self, kind: RunKind, triggered_by: &str) -> SyncRun {
        let mut run = SyncRun::start(kind, triggered_by);
        info!(
            "Starting {:?} sync run {} (triggered by {})",
            kind, run.id, triggered_by
        );
        self.transformer.clear_cache();

        if let Err(e) = self.execute(&mut run).await {
            error!("Sync run {} aborted: {}", run.id, e);
            if let Err(state) = run.record_error("sync error", format!("Unexpected error: {}", e)) {
                error!("Could not record failure on run {}: {}", run.id, state);
            }
        }

        if !run.is_finished() {
            if let Err(e) = run.finish() {
                error!("Could not finish run {}: {}", run.id, e);
            }
        }

        if let Err(e) = self.runs.save(&run).await {
            error!("Failed to persist final state of run {}: {}", run.id, e);
        }

        let (successes, errors) = run.outcome_counts();
        info!(
            "Sync run {} finished as {:?}: {} success / {} error details",
            run.id, run.status, successes, errors
        );
        run
    }

    async fn execute(&self, run: &mut SyncRun) -> Result<(), SyncError> {
        self.runs.save(run).await?;

        let queries = match self.queries.list_active_queries_by_priority().await {
            Ok(queries) => queries,
            Err(e) => {
                warn!("Could not load active queries: {}", e);
                run.record_error("fetch queries", format!("Failed to load active queries: {}", e))?;
                return Ok(());
            }
        };

        if queries.is_empty() {
            info!("No active queries configured");
            run.record_success("no active queries", "No active queries configured, nothing to sync")?;
            return Ok(());
        }

        run.record_success("fetch queries", format!("{} active queries", queries.len()))?;

        for query in &queries {
            self.execute_query(query, run).await?;
            self.runs.save(run).await?;
        }

        Ok(())
    }

    /// Per-query boundary: every failure inside becomes a detail.
    async fn execute_query(&self, query: &SyncQuery, run: &mut SyncRun) -> Result<(), SyncError> {
        let label = format!("execute query {}", query.name);
        info!(
            "Executing query {} (priority {}): {}",
            query.name, query.priority, query.expression
        );
        let started = Instant::now();

        let items = match self.run_query(query, run).await {
            Ok(report) => {
                let items = report.stats.total_items;
                match report.error {
                    Some(failure) => {
                        warn!("Query {} failed: {}", query.name, failure);
                        run.record_error(
                            label,
                            format!(
                                "{} (after {} page(s); {})",
                                SyncError::from(failure),
                                report.pages,
                                report.stats.summary()
                            ),
                        )?;
                    }
                    None if report.stats.total_items == 0 => {
                        info!("Query {} matched no issues", query.name);
                        run.record_success(label, "No issues found")?;
                    }
                    None => {
                        info!("Query {} done: {}", query.name, report.stats.summary());
                        run.record_success(
                            label,
                            format!(
                                "{} page(s): {} ({} reported by tracker)",
                                report.pages,
                                report.stats.summary(),
                                report.total
                            ),
                        )?;
                    }
                }
                items
            }
            Err(e) => {
                warn!("Query {} failed: {}", query.name, e);
                run.record_error(label, e.to_string())?;
                0
            }
        };

        if self.config.performance_monitoring {
            let elapsed = started.elapsed();
            run.record_success(
                format!("performance {}", query.name),
                format!(
                    "{} items in {} ms ({})",
                    items,
                    elapsed.as_millis(),
                    format_rate(items, elapsed)
                ),
            )?;
        }

        Ok(())
    }

    async fn run_query(&self, query: &SyncQuery, run: &mut SyncRun) -> Result<QueryReport, SyncError> {
        let outcome = self.fetcher.fetch_all(query).await;
        let mut report = QueryReport {
            pages: outcome.pages,
            total: outcome.total,
            stats: BatchStats::default(),
            error: outcome.error,
        };

        if !outcome.items.is_empty() {
            let context = RunContext {
                run_id: run.id.clone(),
                query_name: query.name.clone(),
                template_id: query.template_id.clone(),
            };
            report.stats = self
                .processor
                .process_all(outcome.items, &context, run)
                .await?;
        }

        Ok(report)
    }
}
