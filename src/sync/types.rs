use std::time::Duration;

/// A search failure after classification.
///
/// This is a closed set: the retry engine matches on it exhaustively to pick a policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
	#[error("Authentication failed (HTTP {status}): {message}")]
	AuthFailure { status: u16, message: String },

	#[error("Rate limited, retry after {}s: {message}", retry_after.as_secs())]
	RateLimited {
		retry_after: Duration,
		message: String,
	},

	#[error("Transient failure: {0}")]
	Transient(String),

	#[error("Non-retryable failure: {0}")]
	NonRetryable(String),
}

impl FetchFailure {
	/// Whether the retry engine may attempt the call again.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			FetchFailure::RateLimited { .. } | FetchFailure::Transient(_)
		)
	}

	pub fn kind(&self) -> &'static str {
		match self {
			FetchFailure::AuthFailure { .. } => "auth_failure",
			FetchFailure::RateLimited { .. } => "rate_limited",
			FetchFailure::Transient(_) => "transient",
			FetchFailure::NonRetryable(_) => "non_retryable",
		}
	}
}

/// Errors raised while turning a raw issue into a canonical record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
	#[error("Template not found: {0}")]
	TemplateNotFound(String),

	#[error("Required field '{field}' missing (pointer {pointer})")]
	MissingField { field: String, pointer: String },

	#[error("Invalid canonical output: {0}")]
	InvalidOutput(String),

	#[error("Render error: {0}")]
	Render(String),

	#[error("Template lookup failed: {0}")]
	Lookup(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
	#[error("Persistence failure while applying record: {0}")]
	Persistence(String),

	#[error("Record rejected: {0}")]
	Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Storage error: {0}")]
	Storage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
	#[error("Notification delivery failed: {0}")]
	Delivery(String),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Missing configuration value: {0}")]
	Missing(&'static str),

	#[error("Invalid value for {key}: {value:?}")]
	Invalid { key: &'static str, value: String },
}

/// Umbrella error for the sync engine
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Fetch error: {0}")]
	FetchError(#[from] FetchFailure),

	#[error("Transform error: {0}")]
	TransformError(#[from] TransformError),

	#[error("Reconcile error: {0}")]
	ReconcileError(#[from] ReconcileError),

	#[error("Persistence error: {0}")]
	PersistenceError(#[from] PersistenceError),

	#[error("Invalid run state: {0}")]
	StateError(String),
}
