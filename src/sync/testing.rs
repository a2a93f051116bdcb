//! Test doubles shared by the sync module tests.

use crate::sync::history::SyncRun;
use crate::sync::notifications::NotificationSink;
use crate::sync::reconcile::{ReconciliationApplier, RunContext};
use crate::sync::repositories::{
	InMemorySyncRunRepository, InMemoryTemplateRepository, SyncQuery, SyncRunRepository,
};
use crate::sync::transformer::{FieldMappingEngine, RecordTransformer, Template};
use crate::sync::types::{FetchFailure, NotificationError, PersistenceError, ReconcileError};
use crate::tracker::{IssueSearch, SearchApiError, SearchPage};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// `count` issues keyed `{prefix}-1..={count}`.
pub fn issues(prefix: &str, count: usize) -> Vec<Value> {
	(1..=count)
		.map(|i| {
			json!({
				"key": format!("{prefix}-{i}"),
				"fields": {"summary": format!("Issue {i} of {prefix}")}
			})
		})
		.collect()
}

/// Active query named `name` searching `project = {name}` with the `issue-v1` template.
pub fn query(name: &str, priority: i32) -> SyncQuery {
	SyncQuery {
		id: format!("q-{name}"),
		name: name.to_string(),
		expression: format!("project = {name}"),
		template_id: "issue-v1".to_string(),
		priority,
		active: true,
	}
}

pub fn issue_template() -> Template {
	Template {
		id: "issue-v1".to_string(),
		name: "Issue".to_string(),
		fields: BTreeMap::from([
			("key".to_string(), "/key".to_string()),
			("summary".to_string(), "/fields/summary".to_string()),
		]),
		required: vec!["key".to_string(), "summary".to_string()],
	}
}

pub fn test_transformer() -> Arc<RecordTransformer> {
	Arc::new(RecordTransformer::new(
		Arc::new(InMemoryTemplateRepository::new(vec![issue_template()])),
		Arc::new(FieldMappingEngine),
	))
}

struct ScriptedFailure {
	expression: Option<String>,
	offset: Option<u64>,
	error: SearchApiError,
	remaining: u32,
}

/// Search API serving fixed datasets, with injectable failures
#[derive(Default)]
pub struct ScriptedSearch {
	datasets: HashMap<String, Vec<Value>>,
	failures: Mutex<Vec<ScriptedFailure>>,
	calls: Mutex<Vec<(String, u32, u64)>>,
	/// Report `total` as 0, like a response without the field.
	omit_totals: bool,
}

impl ScriptedSearch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_dataset(mut self, expression: &str, items: Vec<Value>) -> Self {
		self.datasets.insert(expression.to_string(), items);
		self
	}

	pub fn without_totals(mut self) -> Self {
		self.omit_totals = true;
		self
	}

	/// Fail once for any query at `offset`.
	pub fn fail_at(self, offset: u64, error: SearchApiError) -> Self {
		self.push_failure(None, Some(offset), error, 1)
	}

	/// Fail the next `times` calls for `expression`.
	pub fn fail_query(self, expression: &str, error: SearchApiError, times: u32) -> Self {
		self.push_failure(Some(expression.to_string()), None, error, times)
	}

	fn push_failure(
		self,
		expression: Option<String>,
		offset: Option<u64>,
		error: SearchApiError,
		remaining: u32,
	) -> Self {
		self.failures.lock().unwrap().push(ScriptedFailure {
			expression,
			offset,
			error,
			remaining,
		});
		self
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().unwrap().len()
	}

	pub fn offsets(&self) -> Vec<u64> {
		self.calls.lock().unwrap().iter().map(|c| c.2).collect()
	}

	pub fn calls_for(&self, expression: &str) -> usize {
		self.calls
			.lock()
			.unwrap()
			.iter()
			.filter(|c| c.0 == expression)
			.count()
	}
}

#[async_trait::async_trait]
impl IssueSearch for ScriptedSearch {
	async fn search(
		&self,
		expression: &str,
		page_size: u32,
		offset: u64,
	) -> Result<SearchPage, SearchApiError> {
		self.calls
			.lock()
			.unwrap()
			.push((expression.to_string(), page_size, offset));

		{
			let mut failures = self.failures.lock().unwrap();
			let hit = failures.iter_mut().find(|f| {
				f.remaining > 0
					&& f.expression.as_deref().is_none_or(|e| e == expression)
					&& f.offset.is_none_or(|o| o == offset)
			});
			if let Some(failure) = hit {
				failure.remaining -= 1;
				return Err(failure.error.clone());
			}
		}

		let items = self.datasets.get(expression).cloned().unwrap_or_default();
		let total = if self.omit_totals { 0 } else { items.len() as u64 };
		let page = items
			.into_iter()
			.skip(offset as usize)
			.take(page_size as usize)
			.collect();
		Ok(SearchPage::new(page, total, offset))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExhaustionRecord {
	pub message: String,
	pub query_name: String,
	pub attempts: u32,
	pub last_error: FetchFailure,
}

/// Notification sink that records every call
#[derive(Default)]
pub struct RecordingNotificationSink {
	auth: Mutex<Vec<(String, u16, String)>>,
	exhausted: Mutex<Vec<ExhaustionRecord>>,
}

impl RecordingNotificationSink {
	pub fn auth_failures(&self) -> Vec<(String, u16, String)> {
		self.auth.lock().unwrap().clone()
	}

	pub fn exhaustions(&self) -> Vec<ExhaustionRecord> {
		self.exhausted.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl NotificationSink for RecordingNotificationSink {
	async fn notify_auth_failure(
		&self,
		message: &str,
		status: u16,
		query_name: &str,
	) -> Result<(), NotificationError> {
		self.auth
			.lock()
			.unwrap()
			.push((message.to_string(), status, query_name.to_string()));
		Ok(())
	}

	async fn notify_retry_exhausted(
		&self,
		message: &str,
		query_name: &str,
		attempts: u32,
		last_error: &FetchFailure,
	) -> Result<(), NotificationError> {
		self.exhausted.lock().unwrap().push(ExhaustionRecord {
			message: message.to_string(),
			query_name: query_name.to_string(),
			attempts,
			last_error: last_error.clone(),
		});
		Ok(())
	}

	fn name(&self) -> &'static str {
		"RecordingNotificationSink"
	}
}

/// Applier that records applied records and rejects chosen keys
#[derive(Default)]
pub struct RecordingApplier {
	applied: Mutex<Vec<Value>>,
	failing_keys: HashSet<String>,
}

impl RecordingApplier {
	pub fn failing_on(keys: &[&str]) -> Self {
		Self {
			applied: Mutex::new(Vec::new()),
			failing_keys: keys.iter().map(|k| k.to_string()).collect(),
		}
	}

	pub fn applied_keys(&self) -> Vec<String> {
		self.applied
			.lock()
			.unwrap()
			.iter()
			.filter_map(|r| r["key"].as_str().map(str::to_string))
			.collect()
	}
}

#[async_trait::async_trait]
impl ReconciliationApplier for RecordingApplier {
	async fn apply_changes(&self, record: &Value, _context: &RunContext) -> Result<(), ReconcileError> {
		let key = record["key"].as_str().unwrap_or_default();
		if self.failing_keys.contains(key) {
			return Err(ReconcileError::Persistence(format!("cannot store {key}")));
		}
		self.applied.lock().unwrap().push(record.clone());
		Ok(())
	}
}

/// Run repository that fails chosen saves (1-based)
#[derive(Default)]
pub struct FlakyRunRepository {
	inner: InMemorySyncRunRepository,
	failing_saves: HashSet<u32>,
	saves: AtomicU32,
}

impl FlakyRunRepository {
	pub fn failing_on_saves(saves: &[u32]) -> Self {
		Self {
			inner: InMemorySyncRunRepository::new(),
			failing_saves: saves.iter().copied().collect(),
			saves: AtomicU32::new(0),
		}
	}

	pub fn save_count(&self) -> u32 {
		self.saves.load(Ordering::SeqCst)
	}
}

#[async_trait::async_trait]
impl SyncRunRepository for FlakyRunRepository {
	async fn save(&self, run: &SyncRun) -> Result<SyncRun, PersistenceError> {
		let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
		if self.failing_saves.contains(&n) {
			return Err(PersistenceError::Storage(format!("save #{n} rejected")));
		}
		self.inner.save(run).await
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<SyncRun>, PersistenceError> {
		self.inner.find_by_id(id).await
	}

	async fn find_recent(&self, limit: usize) -> Result<Vec<SyncRun>, PersistenceError> {
		self.inner.find_recent(limit).await
	}
}
