//! Downstream application of canonical records.

use crate::sync::types::ReconcileError;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Context handed to the applier with every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunContext {
	pub run_id: String,
	pub query_name: String,
	pub template_id: String,
}

/// Applies canonical records to local storage.
#[async_trait::async_trait]
pub trait ReconciliationApplier: Send + Sync {
	async fn apply_changes(&self, record: &Value, context: &RunContext) -> Result<(), ReconcileError>;
}

/// Applier that appends each record as one JSON line to a file
pub struct JsonLinesApplier {
	path: PathBuf,
	/// Serializes appends from the same process.
	write_lock: Mutex<()>,
}

impl JsonLinesApplier {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			write_lock: Mutex::new(()),
		}
	}
}

#[async_trait::async_trait]
impl ReconciliationApplier for JsonLinesApplier {
	async fn apply_changes(&self, record: &Value, context: &RunContext) -> Result<(), ReconcileError> {
		let mut line = serde_json::to_string(&json!({
			"run_id": context.run_id,
			"query": context.query_name,
			"template_id": context.template_id,
			"record": record,
		}))
		.map_err(|e| ReconcileError::Rejected(format!("record is not serializable: {}", e)))?;
		line.push('\n');

		let _guard = self.write_lock.lock().await;
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| ReconcileError::Persistence(e.to_string()))?;
		}

		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.await
			.map_err(|e| ReconcileError::Persistence(e.to_string()))?;
		file.write_all(line.as_bytes())
			.await
			.map_err(|e| ReconcileError::Persistence(e.to_string()))?;
		file.flush()
			.await
			.map_err(|e| ReconcileError::Persistence(e.to_string()))?;

		debug!("Applied record for query {} to {:?}", context.query_name, self.path);
		Ok(())
	}
}
