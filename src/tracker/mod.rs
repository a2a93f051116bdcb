//! Issue tracker integration
//!
//! This module provides the client and types for talking to the remote ticket-tracking API.
//! The sync engine only depends on the `IssueSearch` trait; `TrackerClient` is the HTTP
//! implementation used by the binary.

/// HTTP client for the tracker search endpoint
mod client;
/// Type definitions for tracker data structures
mod types;

pub use client::{IssueSearch, TrackerClient};
pub use types::*;
