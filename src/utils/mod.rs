//!
//! Utility module for the sync engine.
//!
//! Re-exports id and formatting helpers used throughout the codebase.
/// Identifier and formatting helpers
pub mod index;

pub use index::{format_rate, generate_run_id};
