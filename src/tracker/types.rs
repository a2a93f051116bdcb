//! Types for the remote issue tracker search API

use serde::{Deserialize, Serialize};

/// One page of search results as returned by the tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    /// Raw issue documents, passed through untouched to the transformer.
    #[serde(default)]
    pub issues: Vec<serde_json::Value>,
    /// Total number of matches reported by the tracker for this query.
    #[serde(default)]
    pub total: u64,
    /// Offset the tracker actually served this page from.
    #[serde(rename = "startAt", default)]
    pub offset: u64,
}

impl SearchPage {
    pub fn new(issues: Vec<serde_json::Value>, total: u64, offset: u64) -> Self {
        Self {
            issues,
            total,
            offset,
        }
    }
}

/// Raw errors raised by a search call, before classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchApiError {
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        /// Parsed `Retry-After` header, in seconds.
        retry_after_secs: Option<u64>,
        message: String,
    },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Search error: {0}")]
    Other(String),
}

impl SearchApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        SearchApiError::Status {
            status,
            retry_after_secs: None,
            message: message.into(),
        }
    }

    pub fn throttled(retry_after_secs: Option<u64>, message: impl Into<String>) -> Self {
        SearchApiError::Status {
            status: 429,
            retry_after_secs,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SearchApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchApiError::Timeout(e.to_string())
        } else if e.is_connect() {
            SearchApiError::Connect(e.to_string())
        } else if e.is_decode() {
            SearchApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SearchApiError::status(status.as_u16(), e.to_string())
        } else {
            SearchApiError::Other(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchApiError {
    fn from(e: serde_json::Error) -> Self {
        SearchApiError::Decode(e.to_string())
    }
}
