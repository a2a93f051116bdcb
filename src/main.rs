mod config;
mod sync;
mod tracker;
mod utils;

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{AppConfig, RunMode};
use crate::sync::history::RunStatus;
use crate::sync::notifications::{
	LoggingNotificationSink, NotificationDispatcher, WebhookNotificationSink,
};
use crate::sync::reconcile::JsonLinesApplier;
use crate::sync::repositories::{FileQueryProvider, FileSyncRunRepository, FileTemplateRepository};
use crate::sync::scheduler::SyncScheduler;
use crate::sync::transformer::FieldMappingEngine;
use crate::sync::{SyncCollaborators, SyncOrchestrator};
use crate::tracker::TrackerClient;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting issue sync service");

	let config = match AppConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			std::process::exit(2);
		}
	};

	let mut notifier = NotificationDispatcher::new().with_sink(Arc::new(LoggingNotificationSink));
	if let Some(url) = &config.webhook_url {
		info!("Escalations will also be posted to {}", url);
		notifier.register_sink(Arc::new(WebhookNotificationSink::new(url.clone())));
	}

	let data_dir = &config.data_dir;
	let collaborators = SyncCollaborators {
		search: Arc::new(TrackerClient::new(
			config.tracker_url.clone(),
			config.api_token.clone(),
		)),
		queries: Arc::new(FileQueryProvider::new(data_dir.join("queries.json"))),
		templates: Arc::new(FileTemplateRepository::new(data_dir.join("templates.json"))),
		engine: Arc::new(FieldMappingEngine),
		applier: Arc::new(JsonLinesApplier::new(data_dir.join("records.jsonl"))),
		runs: Arc::new(FileSyncRunRepository::new(data_dir.join("runs"))),
		notifier,
	};

	info!("Created sync orchestrator for {}", config.tracker_url);
	let orchestrator = Arc::new(SyncOrchestrator::new(config.sync.clone(), collaborators));
	let scheduler = SyncScheduler::new(orchestrator, config.interval, config.triggered_by.clone());

	match config.mode {
		RunMode::Once => {
			let run = scheduler.run_once().await;
			let (successes, errors) = run.outcome_counts();
			if run.status == RunStatus::Failed {
				warn!(
					"Sync run {} failed ({} success / {} error details)",
					run.id, successes, errors
				);
				std::process::exit(1);
			}
			info!("Sync run {} completed ({} details)", run.id, successes);
		}
		RunMode::Schedule => {
			scheduler.run(None).await;
		}
	}
}
