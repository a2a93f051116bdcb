//! Retry policy engine for page fetches.
//!
//! Each fetch failure is classified, then one of four policies applies:
//!
//! - `AuthFailure`: no retry, escalate immediately, surface the error.
//! - `RateLimited`: wait the server-directed duration, counts against the attempt budget.
//! - `Transient`: exponential backoff, counts against the attempt budget.
//! - `NonRetryable`: surface the error, no escalation.
//!
//! When the attempt budget runs out the last failure is escalated once and returned.

use crate::sync::classifier::FailureClassifier;
use crate::sync::config::RetryPolicy;
use crate::sync::notifications::{Escalation, NotificationDispatcher};
use crate::sync::types::FetchFailure;
use crate::tracker::SearchApiError;
use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then try again.
    RetryAfter(Duration),
    /// Escalate to operators and surface the failure.
    Escalate,
    /// Surface the failure without escalating.
    GiveUp,
}

/// State of one page-fetch retry sequence. Never persisted.
#[derive(Debug, Default)]
pub struct RetryAttempt {
    pub attempts: u32,
    pub last_error: Option<FetchFailure>,
}

/// Executes search calls under the configured retry policy
#[derive(Clone)]
pub struct RetryEngine {
    policy: RetryPolicy,
    classifier: FailureClassifier,
    notifier: NotificationDispatcher,
}

impl RetryEngine {
    pub fn new(
        policy: RetryPolicy,
        classifier: FailureClassifier,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            policy,
            classifier,
            notifier,
        }
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// `query_name` is only used for logging and escalation payloads.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        query_name: &str,
        mut operation: F,
    ) -> Result<T, FetchFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SearchApiError>>,
    {
        let mut state = RetryAttempt::default();
        let mut backoff = self.backoff();

        loop {
            state.attempts += 1;

            let raw = match operation().await {
                Ok(value) => {
                    if state.attempts > 1 {
                        debug!(
                            query = query_name,
                            attempts = state.attempts,
                            recovered_from = state.last_error.as_ref().map(FetchFailure::kind),
                            "Fetch succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(raw) => raw,
            };

            let failure = self.classifier.classify(&raw);
            let decision = self.decide(&failure, state.attempts, &mut backoff);
            state.last_error = Some(failure.clone());

            match decision {
                RetryDecision::RetryAfter(wait) => {
                    warn!(
                        query = query_name,
                        attempt = state.attempts,
                        max_attempts = self.policy.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        kind = failure.kind(),
                        "Retrying after failure: {}",
                        failure
                    );
                    tokio::time::sleep(wait).await;
                }
                RetryDecision::Escalate => {
                    self.escalate(query_name, &failure, state.attempts).await;
                    return Err(failure);
                }
                RetryDecision::GiveUp => {
                    debug!(
                        query = query_name,
                        kind = failure.kind(),
                        "Not retrying: {}",
                        failure
                    );
                    return Err(failure);
                }
            }
        }
    }

    /// Retry predicate and wait calculator.
    ///
    /// `attempts` is the number of attempts already made, including the one that just failed.
    pub fn decide(
        &self,
        failure: &FetchFailure,
        attempts: u32,
        backoff: &mut ExponentialBackoff,
    ) -> RetryDecision {
        match failure {
            FetchFailure::AuthFailure { .. } => RetryDecision::Escalate,
            failure if !failure.is_retryable() => RetryDecision::GiveUp,
            _ if attempts >= self.policy.max_attempts => RetryDecision::Escalate,
            FetchFailure::RateLimited { retry_after, .. } => RetryDecision::RetryAfter(*retry_after),
            _ => RetryDecision::RetryAfter(backoff.next_backoff().unwrap_or(self.policy.max_delay)),
        }
    }

    /// Escalation callback, fired at most once per retry sequence.
    async fn escalate(&self, query_name: &str, failure: &FetchFailure, attempts: u32) {
        let escalation = match failure {
            FetchFailure::AuthFailure { status, message } => Escalation::AuthFailure {
                message: message.clone(),
                status: *status,
                query_name: query_name.to_string(),
            },
            other => Escalation::RetryExhausted {
                message: format!(
                    "Query '{}' failed after {} attempts: {}",
                    query_name, attempts, other
                ),
                query_name: query_name.to_string(),
                attempts,
                last_error: other.clone(),
            },
        };

        self.notifier.escalate(&escalation).await;
    }

    /// Fresh backoff calculator for one retry sequence.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.policy.base_delay)
            .with_multiplier(self.policy.multiplier)
            .with_max_interval(self.policy.max_delay)
            .with_randomization_factor(self.policy.jitter)
            .with_max_elapsed_time(None)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::RecordingNotificationSink;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn engine(max_attempts: u32) -> (RetryEngine, Arc<RecordingNotificationSink>) {
        let sink = Arc::new(RecordingNotificationSink::default());
        let notifier = NotificationDispatcher::new().with_sink(sink.clone());
        let policy = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.0,
        };
        (
            RetryEngine::new(policy, FailureClassifier::new(Duration::from_secs(60)), notifier),
            sink,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let (engine, sink) = engine(3);
        let calls = AtomicU32::new(0);

        let result = engine
            .execute_with_retry("P1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, SearchApiError>("page") }
            })
            .await;

        assert_eq!(result, Ok("page"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.auth_failures().is_empty());
        assert!(sink.exhaustions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers_with_exponential_backoff() {
        let (engine, sink) = engine(3);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = engine
            .execute_with_retry("P1", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SearchApiError::status(502, "bad gateway"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s then 2s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
        assert!(sink.exhaustions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_escalates_without_retry() {
        let (engine, sink) = engine(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute_with_retry("P1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SearchApiError::status(401, "token expired")) }
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchFailure::AuthFailure { status: 401, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.auth_failures(),
            vec![("token expired".to_string(), 401, "P1".to_string())]
        );
        assert!(sink.exhaustions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honours_server_wait_and_escalates_on_exhaustion() {
        let (engine, sink) = engine(3);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = engine
            .execute_with_retry("P1", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    Err(SearchApiError::throttled(
                        Some(7),
                        format!("throttled #{n}"),
                    ))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two waits of 7s between three attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(14) && elapsed < Duration::from_secs(15));

        let last = FetchFailure::RateLimited {
            retry_after: Duration::from_secs(7),
            message: "throttled #3".to_string(),
        };
        assert_eq!(result, Err(last.clone()));

        let exhaustions = sink.exhaustions();
        assert_eq!(exhaustions.len(), 1);
        assert_eq!(exhaustions[0].query_name, "P1");
        assert_eq!(exhaustions[0].attempts, 3);
        assert_eq!(exhaustions[0].last_error, last);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhaustion_escalates_once_after_backoff() {
        let (engine, sink) = engine(3);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = engine
            .execute_with_retry("P1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SearchApiError::status(502, "bad gateway")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s then 2s, no wait after the last attempt
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));

        let last = FetchFailure::Transient("HTTP 502: bad gateway".to_string());
        assert_eq!(result, Err(last.clone()));

        let exhaustions = sink.exhaustions();
        assert_eq!(exhaustions.len(), 1);
        assert_eq!(exhaustions[0].attempts, 3);
        assert_eq!(exhaustions[0].last_error, last);
        assert!(sink.auth_failures().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast_without_escalation() {
        let (engine, sink) = engine(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute_with_retry("P1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SearchApiError::status(400, "bad jql")) }
            })
            .await;

        assert!(matches!(result, Err(FetchFailure::NonRetryable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.auth_failures().is_empty());
        assert!(sink.exhaustions().is_empty());
    }

    #[test]
    fn test_backoff_delays_grow_and_cap() {
        let (engine, _) = engine(10);
        let mut backoff = engine.backoff();
        let transient = FetchFailure::Transient("x".into());

        let waits: Vec<RetryDecision> = (1..=6)
            .map(|attempt| engine.decide(&transient, attempt, &mut backoff))
            .collect();

        assert_eq!(
            waits,
            vec![
                RetryDecision::RetryAfter(Duration::from_secs(1)),
                RetryDecision::RetryAfter(Duration::from_secs(2)),
                RetryDecision::RetryAfter(Duration::from_secs(4)),
                RetryDecision::RetryAfter(Duration::from_secs(8)),
                RetryDecision::RetryAfter(Duration::from_secs(16)),
                RetryDecision::RetryAfter(Duration::from_secs(30)),
            ]
        );
    }

    #[test]
    fn test_ceiling_applies_to_rate_limits() {
        let (engine, _) = engine(2);
        let mut backoff = engine.backoff();
        let throttled = FetchFailure::RateLimited {
            retry_after: Duration::from_secs(5),
            message: "slow".into(),
        };

        assert_eq!(
            engine.decide(&throttled, 1, &mut backoff),
            RetryDecision::RetryAfter(Duration::from_secs(5))
        );
        assert_eq!(
            engine.decide(&throttled, 2, &mut backoff),
            RetryDecision::Escalate
        );
    }
}
