//! Failure classification for search calls.
//!
//! Maps every raw `SearchApiError` onto exactly one `FetchFailure` class. Classification is pure;
//! anything not recognised as auth, throttling or a transient fault is `NonRetryable`.

use crate::sync::types::FetchFailure;
use crate::tracker::SearchApiError;
use std::time::Duration;

/// Classifies raw search errors.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    /// Wait applied to a throttling response that carries no usable hint.
    default_rate_limit_wait: Duration,
}

impl FailureClassifier {
    pub fn new(default_rate_limit_wait: Duration) -> Self {
        Self {
            default_rate_limit_wait,
        }
    }

    pub fn classify(&self, error: &SearchApiError) -> FetchFailure {
        match error {
            SearchApiError::Status {
                status,
                retry_after_secs,
                message,
            } => match (*status, *retry_after_secs) {
                (401 | 403, _) => FetchFailure::AuthFailure {
                    status: *status,
                    message: message.clone(),
                },
                (429, hint) => FetchFailure::RateLimited {
                    retry_after: hint
                        .map(Duration::from_secs)
                        .unwrap_or(self.default_rate_limit_wait),
                    message: message.clone(),
                },
                (503, Some(secs)) => FetchFailure::RateLimited {
                    retry_after: Duration::from_secs(secs),
                    message: message.clone(),
                },
                (408, _) | (500..=599, _) => {
                    FetchFailure::Transient(format!("HTTP {}: {}", status, message))
                }
                _ => FetchFailure::NonRetryable(format!("HTTP {}: {}", status, message)),
            },
            SearchApiError::Timeout(message) | SearchApiError::Connect(message) => {
                FetchFailure::Transient(message.clone())
            }
            SearchApiError::Decode(message) | SearchApiError::Other(message) => {
                FetchFailure::NonRetryable(message.clone())
            }
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
