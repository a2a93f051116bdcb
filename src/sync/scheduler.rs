//! Periodic execution of sync runs.
//!
//! Runs never overlap: the next tick is only awaited once the previous run has returned, and
//! ticks missed while a run was in flight are skipped rather than replayed.

use crate::sync::history::{RunKind, SyncRun};
use crate::sync::orchestrator::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    triggered_by: String,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration, triggered_by: String) -> Self {
        Self {
            orchestrator,
            interval,
            triggered_by,
        }
    }

    /// Trigger a single manual run.
    pub async fn run_once(&self) -> SyncRun {
        self.orchestrator
            .run(RunKind::Manual, &self.triggered_by)
            .await
    }

    /// Run on every tick, the first one immediately. Stops after `max_runs` runs when given.
    ///
    /// Returns the number of runs executed.
    pub async fn run(&self, max_runs: Option<usize>) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Scheduling sync runs every {:?}", self.interval);

        let mut executed = 0;
        while max_runs.is_none_or(|max| executed < max) {
            ticker.tick().await;
            let run = self
                .orchestrator
                .run(RunKind::Scheduled, &self.triggered_by)
                .await;
            executed += 1;
            info!(
                "Scheduled run {} finished as {:?} ({} so far)",
                run.id, run.status, executed
            );
        }
        executed
    }
}
