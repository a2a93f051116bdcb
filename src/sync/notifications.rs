//! Operator escalation for unrecoverable fetch failures.
//!
//! Two situations escalate: an authentication failure on any page fetch, and an exhausted retry
//! budget for throttled or transient failures. Escalations are fanned out to every registered
//! `NotificationSink` by the `NotificationDispatcher`. Delivery is best effort: a sink error is
//! logged and never reaches the sync run.

use crate::sync::types::{FetchFailure, NotificationError};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// An escalation raised by the retry engine
#[derive(Debug, Clone, PartialEq)]
pub enum Escalation {
    /// The tracker rejected our credentials. Raised before any retry logic runs.
    AuthFailure {
        message: String,
        status: u16,
        query_name: String,
    },
    /// The retry budget for a page fetch ran out.
    RetryExhausted {
        message: String,
        query_name: String,
        attempts: u32,
        last_error: FetchFailure,
    },
}

/// Operator-facing notification channel.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_auth_failure(
        &self,
        message: &str,
        status: u16,
        query_name: &str,
    ) -> Result<(), NotificationError>;

    async fn notify_retry_exhausted(
        &self,
        message: &str,
        query_name: &str,
        attempts: u32,
        last_error: &FetchFailure,
    ) -> Result<(), NotificationError>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Dispatches escalations to all registered sinks.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Register a sink. Sinks are notified in registration order.
    pub fn register_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.register_sink(sink);
        self
    }

    /// Deliver an escalation to every sink.
    ///
    /// Sink failures are logged and swallowed; remaining sinks still run.
    pub async fn escalate(&self, escalation: &Escalation) {
        if self.sinks.is_empty() {
            warn!("No notification sinks registered, dropping escalation: {escalation:?}");
            return;
        }

        for sink in &self.sinks {
            let result = match escalation {
                Escalation::AuthFailure {
                    message,
                    status,
                    query_name,
                } => sink.notify_auth_failure(message, *status, query_name).await,
                Escalation::RetryExhausted {
                    message,
                    query_name,
                    attempts,
                    last_error,
                } => {
                    sink.notify_retry_exhausted(message, query_name, *attempts, last_error)
                        .await
                }
            };

            if let Err(e) = result {
                error!("Notification sink {} failed to deliver escalation: {}", sink.name(), e);
            }
        }
    }
}

/// Sink that writes escalations to the log
pub struct LoggingNotificationSink;

#[async_trait::async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify_auth_failure(
        &self,
        message: &str,
        status: u16,
        query_name: &str,
    ) -> Result<(), NotificationError> {
        error!(
            query = query_name,
            status, "Tracker authentication failed: {}", message
        );
        Ok(())
    }

    async fn notify_retry_exhausted(
        &self,
        message: &str,
        query_name: &str,
        attempts: u32,
        last_error: &FetchFailure,
    ) -> Result<(), NotificationError> {
        error!(
            query = query_name,
            attempts,
            kind = last_error.kind(),
            "Retries exhausted: {}",
            message
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingNotificationSink"
    }
}

/// Sink that POSTs escalations as JSON to a webhook
pub struct WebhookNotificationSink {
    http_client: Client,
    url: String,
}

impl WebhookNotificationSink {
    pub fn new(url: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client, url }
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), NotificationError> {
        let response = self.http_client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "webhook returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify_auth_failure(
        &self,
        message: &str,
        status: u16,
        query_name: &str,
    ) -> Result<(), NotificationError> {
        self.post(json!({
            "event": "auth_failure",
            "message": message,
            "status": status,
            "query": query_name,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
        .await
    }

    async fn notify_retry_exhausted(
        &self,
        message: &str,
        query_name: &str,
        attempts: u32,
        last_error: &FetchFailure,
    ) -> Result<(), NotificationError> {
        self.post(json!({
            "event": "retry_exhausted",
            "message": message,
            "query": query_name,
            "attempts": attempts,
            "error_kind": last_error.kind(),
            "last_error": last_error.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
        .await
    }

    fn name(&self) -> &'static str {
        "WebhookNotificationSink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::RecordingNotificationSink;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct BrokenSink;

    #[async_trait::async_trait]
    impl NotificationSink for BrokenSink {
        async fn notify_auth_failure(&self, _: &str, _: u16, _: &str) -> Result<(), NotificationError> {
            Err(NotificationError::Delivery("channel down".into()))
        }

        async fn notify_retry_exhausted(
            &self,
            _: &str,
            _: &str,
            _: u32,
            _: &FetchFailure,
        ) -> Result<(), NotificationError> {
            Err(NotificationError::Delivery("channel down".into()))
        }

        fn name(&self) -> &'static str {
            "BrokenSink"
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let recorder = Arc::new(RecordingNotificationSink::default());
        let dispatcher = NotificationDispatcher::new()
            .with_sink(Arc::new(BrokenSink))
            .with_sink(recorder.clone());

        dispatcher
            .escalate(&Escalation::AuthFailure {
                message: "expired".into(),
                status: 401,
                query_name: "P1".into(),
            })
            .await;

        assert_eq!(recorder.auth_failures().len(), 1);
        assert!(recorder.exhaustions().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_posts_exhaustion_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/sync"))
            .and(body_partial_json(json!({
                "event": "retry_exhausted",
                "query": "P1",
                "attempts": 3,
                "error_kind": "transient"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookNotificationSink::new(format!("{}/hooks/sync", server.uri()));
        sink.notify_retry_exhausted(
            "giving up",
            "P1",
            3,
            &FetchFailure::Transient("HTTP 502".into()),
        )
        .await
        .expect("webhook accepts payload");
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookNotificationSink::new(server.uri());
        let result = sink.notify_auth_failure("expired", 401, "P1").await;
        assert!(matches!(result, Err(NotificationError::Delivery(_))));
    }
}
