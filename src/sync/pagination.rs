//! Offset-based pagination over the tracker search API.
//!
//! `PaginatedFetcher::pages` yields a finite, non-restartable stream of pages for one query;
//! each page fetch goes through the retry engine on its own, so a failure on a later page never
//! re-fetches earlier ones. The cursor trusts the `total` of the most recent response.

use crate::sync::repositories::SyncQuery;
use crate::sync::retry::RetryEngine;
use crate::sync::types::FetchFailure;
use crate::tracker::{IssueSearch, SearchPage};
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Position within one query's result set. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
	/// Items already consumed.
	pub offset: u64,
	pub page_size: u32,
	/// Total reported by the latest response; `None` before the first page.
	pub total: Option<u64>,
	exhausted: bool,
}

impl PageCursor {
	pub fn new(page_size: u32) -> Self {
		Self {
			offset: 0,
			page_size,
			total: None,
			exhausted: false,
		}
	}

	pub fn is_exhausted(&self) -> bool {
		self.exhausted
	}

	/// Move past `page`, re-reading the total from it.
	pub fn advance(&mut self, page: &SearchPage) {
		self.total = Some(page.total);

		if page.issues.is_empty() && self.offset < page.total {
			warn!(
				"Tracker returned an empty page at offset {} with total {}, stopping",
				self.offset, page.total
			);
			self.exhausted = true;
			return;
		}

		self.offset += u64::from(self.page_size);
		if self.offset >= page.total {
			self.exhausted = true;
		}
	}
}

/// Everything fetched for one query
#[derive(Debug, Default)]
pub struct FetchOutcome {
	pub items: Vec<Value>,
	pub pages: usize,
	/// Total reported by the last successful page.
	pub total: u64,
	/// Set when a page fetch failed for good. `items` then holds the earlier pages.
	pub error: Option<FetchFailure>,
}

/// Fetches every page of a query through the retry engine
pub struct PaginatedFetcher {
	search: Arc<dyn IssueSearch>,
	retry: RetryEngine,
	page_size: u32,
}

impl PaginatedFetcher {
	pub fn new(search: Arc<dyn IssueSearch>, retry: RetryEngine, page_size: u32) -> Self {
		Self {
			search,
			retry,
			page_size: page_size.max(1),
		}
	}

	/// Lazy stream of pages for `query`, starting from offset 0.
	pub fn pages<'a>(
		&'a self,
		query: &'a SyncQuery,
	) -> impl Stream<Item = Result<SearchPage, FetchFailure>> + 'a {
		futures::stream::try_unfold(PageCursor::new(self.page_size), move |mut cursor| async move {
			if cursor.is_exhausted() {
				return Ok(None);
			}

			let page = self
				.retry
				.execute_with_retry(&query.name, || {
					self.search
						.search(&query.expression, cursor.page_size, cursor.offset)
				})
				.await?;

			debug!(
				"Query {}: page at offset {} returned {} of {} issues",
				query.name,
				cursor.offset,
				page.issues.len(),
				page.total
			);
			cursor.advance(&page);
			Ok(Some((page, cursor)))
		})
	}

	/// Drain the page stream, keeping whatever was fetched before a failure.
	pub async fn fetch_all(&self, query: &SyncQuery) -> FetchOutcome {
		let mut outcome = FetchOutcome::default();
		let pages = self.pages(query);
		futures::pin_mut!(pages);

		loop {
			match pages.try_next().await {
				Ok(Some(page)) => {
					outcome.pages += 1;
					outcome.total = page.total;
					outcome.items.extend(page.issues);
				}
				Ok(None) => break,
				Err(failure) => {
					outcome.error = Some(failure);
					break;
				}
			}
		}

		outcome
	}
}
