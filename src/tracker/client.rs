//!
//! HTTP client for the remote issue tracker search API.
//!
//! The tracker exposes a paginated search endpoint taking a query expression, a page size and
//! an offset. This client performs exactly one request per call; retrying and classification
//! are the caller's business.

use super::types::*;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use std::time::Duration;
use tracing::debug;

/// The external search operation the sync engine pages through.
#[async_trait::async_trait]
pub trait IssueSearch: Send + Sync {
	/// Fetch one page of issues matching `expression`, starting at `offset`.
	async fn search(
		&self,
		expression: &str,
		page_size: u32,
		offset: u64,
	) -> Result<SearchPage, SearchApiError>;
}

/// Issue tracker REST client
#[derive(Clone)]
pub struct TrackerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the tracker, without a trailing slash.
	base_url: String,
	/// Optional bearer token sent with every request.
	api_token: Option<String>,
}

impl TrackerClient {
	/// Create a new tracker client.
	///
	/// # Arguments
	/// * `base_url` - The tracker base URL, e.g. `https://tracker.example.com`.
	/// * `api_token` - Optional bearer token.
	pub fn new(base_url: String, api_token: Option<String>) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self::with_client(http_client, base_url, api_token)
	}

	/// Create a tracker client around an existing reqwest client.
	pub fn with_client(http_client: Client, base_url: String, api_token: Option<String>) -> Self {
		Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			api_token,
		}
	}

	fn search_url(&self) -> String {
		format!("{}/rest/api/2/search", self.base_url)
	}
}

#[async_trait::async_trait]
impl IssueSearch for TrackerClient {
	async fn search(
		&self,
		expression: &str,
		page_size: u32,
		offset: u64,
	) -> Result<SearchPage, SearchApiError> {
		debug!(
			"Searching tracker: jql={:?}, maxResults={}, startAt={}",
			expression, page_size, offset
		);

		let mut request = self.http_client.get(self.search_url()).query(&[
			("jql", expression.to_string()),
			("maxResults", page_size.to_string()),
			("startAt", offset.to_string()),
		]);
		if let Some(token) = &self.api_token {
			request = request.bearer_auth(token);
		}

		let response = request.send().await?;
		let status = response.status();

		if !status.is_success() {
			let retry_after_secs = response
				.headers()
				.get(RETRY_AFTER)
				.and_then(|v| v.to_str().ok())
				.and_then(|v| v.trim().parse::<u64>().ok());
			let body = response.text().await.unwrap_or_default();
			return Err(SearchApiError::Status {
				status: status.as_u16(),
				retry_after_secs,
				message: status_message(status, &body),
			});
		}

		let text = response.text().await?;
		let page: SearchPage = serde_json::from_str(&text)?;

		debug!(
			"Tracker returned {} issues (total {}, startAt {})",
			page.issues.len(),
			page.total,
			page.offset
		);
		Ok(page)
	}
}

fn status_message(status: StatusCode, body: &str) -> String {
	let reason = status.canonical_reason().unwrap_or("Unknown status");
	let body = body.trim();
	if body.is_empty() {
		reason.to_string()
	} else {
		let snippet: String = body.chars().take(200).collect();
		format!("{}: {}", reason, snippet)
	}
}
