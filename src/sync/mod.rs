//! Issue Synchronization Module
//!
//! This module provides the engine that mirrors issue-tracker search results into local records.
//! It is composed of several submodules, each responsible for a specific aspect of a sync run:
//!
//! - `orchestrator`: The main entry point. Executes active queries in priority order and builds the run's audit trail.
//! - `pagination`: Pages through a query's result set, one retried fetch per page.
//! - `retry` and `classifier`: Map raw API errors to failure kinds and decide whether and how long to wait.
//! - `notifications`: Escalation sinks for authentication failures and exhausted retries.
//! - `batch_processor` and `progress_tracker`: Transform and apply items with per-item isolation and chunked progress.
//! - `transformer`, `reconcile`, `repositories`: Collaborators for templates, downstream persistence and run history.
//! - `scheduler`: Periodic and manual run triggers.
//!
//! A run fails when any recorded step fails, but a failing item never stops its siblings and a
//! failing query never stops the queries after it.

/// Chunked, failure-isolated item processing
pub mod batch_processor;
/// Classification of search API errors
pub mod classifier;
/// Engine configuration
pub mod config;
/// Run aggregate and audit details
pub mod history;
/// Escalation sinks and dispatcher
pub mod notifications;
/// Main coordinator for sync runs
pub mod orchestrator;
/// Offset pagination over the search API
pub mod pagination;
/// Chunk and item counters
pub mod progress_tracker;
/// Downstream record appliers
pub mod reconcile;
/// Queries, templates and run storage
pub mod repositories;
/// Retry engine for page fetches
pub mod retry;
/// Periodic run trigger
pub mod scheduler;
/// Record transformation through templates
pub mod transformer;
/// Error and failure types
pub mod types;

#[cfg(test)]
pub mod testing;

pub use orchestrator::*;
