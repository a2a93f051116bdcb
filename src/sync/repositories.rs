use crate::sync::history::SyncRun;
use crate::sync::transformer::Template;
use crate::sync::types::PersistenceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// An operator-defined query against the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQuery {
	pub id: String,
	pub name: String,
	/// Query expression passed verbatim to the tracker search.
	pub expression: String,
	pub template_id: String,
	/// Lower runs first.
	pub priority: i32,
	#[serde(default = "default_active")]
	pub active: bool,
}

fn default_active() -> bool {
	true
}

/// Source of the queries to execute
#[async_trait::async_trait]
pub trait QueryProvider: Send + Sync {
	/// Active queries only, ascending by priority.
	async fn list_active_queries_by_priority(&self) -> Result<Vec<SyncQuery>, PersistenceError>;
}

/// Repository for transformation templates
#[async_trait::async_trait]
pub trait TemplateRepository: Send + Sync {
	async fn find_template_by_id(&self, id: &str) -> Result<Option<Template>, PersistenceError>;
}

/// Repository for run history
#[async_trait::async_trait]
pub trait SyncRunRepository: Send + Sync {
	/// Insert or replace the run with the same id.
	async fn save(&self, run: &SyncRun) -> Result<SyncRun, PersistenceError>;
	async fn find_by_id(&self, id: &str) -> Result<Option<SyncRun>, PersistenceError>;
	/// Most recent runs first.
	async fn find_recent(&self, limit: usize) -> Result<Vec<SyncRun>, PersistenceError>;
}

fn active_by_priority(queries: impl IntoIterator<Item = SyncQuery>) -> Vec<SyncQuery> {
	let mut active: Vec<SyncQuery> = queries.into_iter().filter(|q| q.active).collect();
	active.sort_by_key(|q| q.priority);
	active
}

/// File-based implementation of QueryProvider
///
/// Reads a JSON array of queries on every call so edits apply to the next run.
pub struct FileQueryProvider {
	path: PathBuf,
}

impl FileQueryProvider {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}
}

#[async_trait::async_trait]
impl QueryProvider for FileQueryProvider {
	async fn list_active_queries_by_priority(&self) -> Result<Vec<SyncQuery>, PersistenceError> {
		let content = tokio::fs::read_to_string(&self.path).await?;
		let queries: Vec<SyncQuery> = serde_json::from_str(&content)?;
		let total = queries.len();
		let active = active_by_priority(queries);

		debug!(
			"Loaded {} queries from {:?}, {} active",
			total,
			self.path,
			active.len()
		);
		Ok(active)
	}
}

/// File-based implementation of TemplateRepository
pub struct FileTemplateRepository {
	path: PathBuf,
}

impl FileTemplateRepository {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}
}

#[async_trait::async_trait]
impl TemplateRepository for FileTemplateRepository {
	async fn find_template_by_id(&self, id: &str) -> Result<Option<Template>, PersistenceError> {
		let content = tokio::fs::read_to_string(&self.path).await?;
		let templates: Vec<Template> = serde_json::from_str(&content)?;
		Ok(templates.into_iter().find(|t| t.id == id))
	}
}

/// File-based implementation of SyncRunRepository
///
/// One pretty-printed JSON file per run, named after the run id.
pub struct FileSyncRunRepository {
	data_dir: PathBuf,
}

impl FileSyncRunRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn get_run_filename(&self, id: &str) -> PathBuf {
		self.data_dir.join(format!("sync_run_{}.json", id))
	}

	async fn read_run(path: &Path) -> Result<SyncRun, PersistenceError> {
		let content = tokio::fs::read_to_string(path).await?;
		Ok(serde_json::from_str(&content)?)
	}
}

#[async_trait::async_trait]
impl SyncRunRepository for FileSyncRunRepository {
	async fn save(&self, run: &SyncRun) -> Result<SyncRun, PersistenceError> {
		tokio::fs::create_dir_all(&self.data_dir).await?;

		let content = serde_json::to_string_pretty(run)?;
		let filename = self.get_run_filename(&run.id);
		let tmp_filename = filename.with_extension("json.tmp");

		tokio::fs::write(&tmp_filename, content).await?;
		tokio::fs::rename(&tmp_filename, &filename).await?;

		debug!(
			"Saved sync run {} ({:?}, {} details) to {:?}",
			run.id,
			run.status,
			run.details().len(),
			filename
		);
		Ok(run.clone())
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<SyncRun>, PersistenceError> {
		let filename = self.get_run_filename(id);
		if !tokio::fs::try_exists(&filename).await? {
			return Ok(None);
		}
		Ok(Some(Self::read_run(&filename).await?))
	}

	async fn find_recent(&self, limit: usize) -> Result<Vec<SyncRun>, PersistenceError> {
		if !tokio::fs::try_exists(&self.data_dir).await? {
			return Ok(Vec::new());
		}

		let mut entries = tokio::fs::read_dir(&self.data_dir).await?;
		let mut runs = Vec::new();

		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			let is_run_file = path
				.file_name()
				.and_then(|f| f.to_str())
				.map(|f| f.starts_with("sync_run_") && f.ends_with(".json"))
				.unwrap_or(false);
			if !is_run_file {
				continue;
			}

			match Self::read_run(&path).await {
				Ok(run) => runs.push(run),
				Err(e) => warn!("Skipping unreadable run file {:?}: {}", path, e),
			}
		}

		runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
		runs.truncate(limit);
		info!("Loaded {} recent sync runs", runs.len());
		Ok(runs)
	}
}

/// In-memory implementation of QueryProvider
#[derive(Default)]
pub struct InMemoryQueryProvider {
	queries: Vec<SyncQuery>,
}

impl InMemoryQueryProvider {
	pub fn new(queries: Vec<SyncQuery>) -> Self {
		Self { queries }
	}
}

#[async_trait::async_trait]
impl QueryProvider for InMemoryQueryProvider {
	async fn list_active_queries_by_priority(&self) -> Result<Vec<SyncQuery>, PersistenceError> {
		Ok(active_by_priority(self.queries.iter().cloned()))
	}
}

/// In-memory implementation of TemplateRepository
#[derive(Default)]
pub struct InMemoryTemplateRepository {
	templates: HashMap<String, Template>,
}

impl InMemoryTemplateRepository {
	pub fn new(templates: Vec<Template>) -> Self {
		Self {
			templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
		}
	}
}

#[async_trait::async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
	async fn find_template_by_id(&self, id: &str) -> Result<Option<Template>, PersistenceError> {
		Ok(self.templates.get(id).cloned())
	}
}

/// In-memory implementation of SyncRunRepository
#[derive(Default)]
pub struct InMemorySyncRunRepository {
	runs: Mutex<HashMap<String, SyncRun>>,
}

impl InMemorySyncRunRepository {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl SyncRunRepository for InMemorySyncRunRepository {
	async fn save(&self, run: &SyncRun) -> Result<SyncRun, PersistenceError> {
		let mut runs = self
			.runs
			.lock()
			.map_err(|e| PersistenceError::Storage(format!("run store poisoned: {}", e)))?;
		runs.insert(run.id.clone(), run.clone());
		Ok(run.clone())
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<SyncRun>, PersistenceError> {
		let runs = self
			.runs
			.lock()
			.map_err(|e| PersistenceError::Storage(format!("run store poisoned: {}", e)))?;
		Ok(runs.get(id).cloned())
	}

	async fn find_recent(&self, limit: usize) -> Result<Vec<SyncRun>, PersistenceError> {
		let runs = self
			.runs
			.lock()
			.map_err(|e| PersistenceError::Storage(format!("run store poisoned: {}", e)))?;
		let mut recent: Vec<SyncRun> = runs.values().cloned().collect();
		recent.sort_by(|a, b| b.started_at.cmp(&a.started_at));
		recent.truncate(limit);
		Ok(recent)
	}
}
