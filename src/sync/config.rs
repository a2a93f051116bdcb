//! Engine configuration.
//!
//! `SyncConfig` is built once (from defaults or the environment) and handed to the orchestrator
//! by value. Nothing in the engine mutates it afterwards.

use crate::sync::types::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// Retry policy for a single page fetch
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub max_attempts: u32,
	/// Delay before the first retry of a transient failure.
	pub base_delay: Duration,
	/// Upper bound for a single backoff delay.
	pub max_delay: Duration,
	/// Growth factor between consecutive backoff delays.
	pub multiplier: f64,
	/// Randomization factor applied to backoff delays (0.0 disables jitter).
	pub jitter: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(60),
			multiplier: 2.0,
			jitter: 0.0,
		}
	}
}

/// Configuration for the sync engine
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
	/// Item lists longer than this are processed in chunks of this size.
	pub batch_size_threshold: usize,
	/// Enables chunked processing of large result sets.
	pub memory_efficient_processing: bool,
	/// Emit progress log lines and progress details.
	pub progress_logging: bool,
	/// Emit a progress detail every N chunks.
	pub progress_interval_chunks: usize,
	/// Release buffer capacity every M chunks.
	pub memory_release_interval_chunks: usize,
	/// Record per-query timing details.
	pub performance_monitoring: bool,
	/// Issues requested per page.
	pub page_size: u32,
	pub retry: RetryPolicy,
	/// Wait used for a throttling response without a usable `Retry-After` hint.
	pub rate_limit_default_wait: Duration,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			batch_size_threshold: 100,
			memory_efficient_processing: true,
			progress_logging: true,
			progress_interval_chunks: 5,
			memory_release_interval_chunks: 10,
			performance_monitoring: false,
			page_size: 50,
			retry: RetryPolicy::default(),
			rate_limit_default_wait: Duration::from_secs(60),
		}
	}
}

impl SyncConfig {
	/// Build a configuration from `ISSUE_SYNC_*` environment variables, falling back to defaults.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Build a configuration from an arbitrary key lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let defaults = Self::default();
		let retry_defaults = RetryPolicy::default();

		let config = Self {
			batch_size_threshold: parse_or(
				&lookup,
				"ISSUE_SYNC_BATCH_SIZE",
				defaults.batch_size_threshold,
			)?,
			memory_efficient_processing: parse_or(
				&lookup,
				"ISSUE_SYNC_MEMORY_EFFICIENT",
				defaults.memory_efficient_processing,
			)?,
			progress_logging: parse_or(
				&lookup,
				"ISSUE_SYNC_PROGRESS_LOGGING",
				defaults.progress_logging,
			)?,
			progress_interval_chunks: parse_or(
				&lookup,
				"ISSUE_SYNC_PROGRESS_INTERVAL",
				defaults.progress_interval_chunks,
			)?,
			memory_release_interval_chunks: parse_or(
				&lookup,
				"ISSUE_SYNC_MEMORY_RELEASE_INTERVAL",
				defaults.memory_release_interval_chunks,
			)?,
			performance_monitoring: parse_or(
				&lookup,
				"ISSUE_SYNC_PERFORMANCE_MONITORING",
				defaults.performance_monitoring,
			)?,
			page_size: parse_or(&lookup, "ISSUE_SYNC_PAGE_SIZE", defaults.page_size)?,
			retry: RetryPolicy {
				max_attempts: parse_or(
					&lookup,
					"ISSUE_SYNC_MAX_ATTEMPTS",
					retry_defaults.max_attempts,
				)?,
				base_delay: Duration::from_millis(parse_or(
					&lookup,
					"ISSUE_SYNC_BACKOFF_BASE_MS",
					retry_defaults.base_delay.as_millis() as u64,
				)?),
				..retry_defaults
			},
			rate_limit_default_wait: Duration::from_secs(parse_or(
				&lookup,
				"ISSUE_SYNC_RATE_LIMIT_WAIT_SECS",
				defaults.rate_limit_default_wait.as_secs(),
			)?),
		};

		config.validate()?;
		Ok(config)
	}

	/// Reject values the engine cannot work with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let checks: [(&'static str, bool, String); 5] = [
			(
				"ISSUE_SYNC_BATCH_SIZE",
				self.batch_size_threshold == 0,
				self.batch_size_threshold.to_string(),
			),
			(
				"ISSUE_SYNC_PAGE_SIZE",
				self.page_size == 0,
				self.page_size.to_string(),
			),
			(
				"ISSUE_SYNC_MAX_ATTEMPTS",
				self.retry.max_attempts == 0,
				self.retry.max_attempts.to_string(),
			),
			(
				"ISSUE_SYNC_PROGRESS_INTERVAL",
				self.progress_interval_chunks == 0,
				self.progress_interval_chunks.to_string(),
			),
			(
				"ISSUE_SYNC_MEMORY_RELEASE_INTERVAL",
				self.memory_release_interval_chunks == 0,
				self.memory_release_interval_chunks.to_string(),
			),
		];

		for (key, invalid, value) in checks {
			if invalid {
				return Err(ConfigError::Invalid { key, value });
			}
		}
		Ok(())
	}
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
	F: Fn(&str) -> Option<String>,
	T: FromStr,
{
	match lookup(key) {
		Some(raw) => raw
			.trim()
			.parse::<T>()
			.map_err(|_| ConfigError::Invalid { key, value: raw }),
		None => Ok(default),
	}
}
