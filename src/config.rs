//! Binary configuration, read from the environment.

use crate::sync::config::SyncConfig;
use crate::sync::types::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// How the binary triggers runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
	/// One manual run, then exit.
	Once,
	/// Scheduled runs until the process is stopped.
	Schedule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
	pub tracker_url: String,
	pub api_token: Option<String>,
	/// Holds `queries.json`, `templates.json`, `runs/` and the applied records file.
	pub data_dir: PathBuf,
	pub webhook_url: Option<String>,
	pub interval: Duration,
	pub triggered_by: String,
	pub mode: RunMode,
	pub sync: SyncConfig,
}

impl AppConfig {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

		let tracker_url =
			non_empty("ISSUE_SYNC_TRACKER_URL").ok_or(ConfigError::Missing("ISSUE_SYNC_TRACKER_URL"))?;

		let interval = match non_empty("ISSUE_SYNC_INTERVAL_SECS") {
			Some(raw) => match raw.trim().parse::<u64>() {
				Ok(secs) if secs > 0 => Duration::from_secs(secs),
				_ => {
					return Err(ConfigError::Invalid {
						key: "ISSUE_SYNC_INTERVAL_SECS",
						value: raw,
					});
				}
			},
			None => Duration::from_secs(900),
		};

		let mode = match non_empty("ISSUE_SYNC_MODE").as_deref().map(str::trim) {
			None | Some("once") => RunMode::Once,
			Some("schedule") => RunMode::Schedule,
			Some(other) => {
				return Err(ConfigError::Invalid {
					key: "ISSUE_SYNC_MODE",
					value: other.to_string(),
				});
			}
		};

		Ok(Self {
			tracker_url,
			api_token: non_empty("ISSUE_SYNC_API_TOKEN"),
			data_dir: non_empty("ISSUE_SYNC_DATA_DIR")
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from("sync_data")),
			webhook_url: non_empty("ISSUE_SYNC_WEBHOOK_URL"),
			interval,
			triggered_by: non_empty("ISSUE_SYNC_TRIGGERED_BY").unwrap_or_else(|| "scheduler".to_string()),
			mode,
			sync: SyncConfig::from_lookup(&lookup)?,
		})
	}
}
