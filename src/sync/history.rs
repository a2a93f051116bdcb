//! Run audit trail.
//!
//! A `SyncRun` is the aggregate built up during one orchestration call. Details are append-only
//! and the run moves to a terminal status exactly once; after that it is read-only.

use crate::sync::types::SyncError;
use crate::utils::generate_run_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Error,
}

/// One audit entry within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStepDetail {
    /// What happened, e.g. `execute query P1`.
    pub label: String,
    pub outcome: StepOutcome,
    /// Human-readable detail or a snapshot of the transformed payload.
    pub payload: String,
    pub recorded_at: DateTime<Utc>,
}

/// One execution of the sync engine across all active queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: String,
    pub kind: RunKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub triggered_by: String,
    details: Vec<SyncStepDetail>,
}

impl SyncRun {
    /// Start a new in-progress run.
    pub fn start(kind: RunKind, triggered_by: impl Into<String>) -> Self {
        Self {
            id: generate_run_id(),
            kind,
            status: RunStatus::InProgress,
            started_at: Utc::now(),
            finished_at: None,
            triggered_by: triggered_by.into(),
            details: Vec::new(),
        }
    }

    pub fn details(&self) -> &[SyncStepDetail] {
        &self.details
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_errors(&self) -> bool {
        self.details
            .iter()
            .any(|d| d.outcome == StepOutcome::Error)
    }

    /// Details whose label starts with `prefix`.
    pub fn details_labelled<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a SyncStepDetail> + 'a {
        self.details
            .iter()
            .filter(move |d| d.label.starts_with(prefix))
    }

    pub fn record(
        &mut self,
        label: impl Into<String>,
        outcome: StepOutcome,
        payload: impl Into<String>,
    ) -> Result<(), SyncError> {
        if self.is_finished() {
            return Err(SyncError::StateError(format!(
                "run {} is already {:?}",
                self.id, self.status
            )));
        }

        self.details.push(SyncStepDetail {
            label: label.into(),
            outcome,
            payload: payload.into(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    pub fn record_success(
        &mut self,
        label: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.record(label, StepOutcome::Success, payload)
    }

    pub fn record_error(
        &mut self,
        label: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.record(label, StepOutcome::Error, payload)
    }

    /// Move to the terminal status implied by the recorded details.
    ///
    /// `Failed` if any detail is an error, `Completed` otherwise. Fails if the run is already
    /// terminal.
    pub fn finish(&mut self) -> Result<RunStatus, SyncError> {
        if self.is_finished() {
            return Err(SyncError::StateError(format!(
                "run {} already finished as {:?}",
                self.id, self.status
            )));
        }

        self.status = if self.has_errors() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.finished_at = Some(Utc::now());
        Ok(self.status)
    }

    /// Count of details by outcome: `(successes, errors)`.
    pub fn outcome_counts(&self) -> (usize, usize) {
        self.details
            .iter()
            .fold((0, 0), |(ok, err), d| match d.outcome {
                StepOutcome::Success => (ok + 1, err),
                StepOutcome::Error => (ok, err + 1),
            })
    }
}
