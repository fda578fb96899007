//! `outreach-monitor` -- submit a generation batch and track it to the end.
//!
//! Submits one email-generation job per target URL, follows every job's
//! progress, logs results as they arrive and optionally saves each one.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default                     |
//! |---------------------------|----------|-----------------------------|
//! | `OUTREACH_API_URL`        | no       | `http://localhost:8000/api` |
//! | `OUTREACH_API_TOKEN`      | no       | --                          |
//! | `POLL_MODE`               | no       | `shared`                    |
//! | `RESULT_POLL_INTERVAL_MS` | no       | `8000`                      |
//! | `REQUEST_TIMEOUT_SECS`    | no       | `30`                        |
//! | `COMPANY_ID`              | yes      | --                          |
//! | `TARGET_URLS`             | yes      | --                          |
//! | `TONE`                    | no       | `professional`              |
//! | `PERSONALIZATION_LEVEL`   | no       | `medium`                    |
//! | `FIND_CONTACT`            | no       | `false`                     |
//! | `CUSTOM_INSTRUCTIONS`     | no       | --                          |
//! | `AUTO_COMMIT`             | no       | `false`                     |

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outreach_client::{Credentials, GenerationApi};
use outreach_monitor::config::{BatchConfig, MonitorConfig};
use outreach_monitor::events::{self, MonitorEvent};
use outreach_monitor::service::CompanyOutbox;
use outreach_monitor::tracker::BatchTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env().context("Invalid monitor configuration")?;
    let batch = BatchConfig::from_env().context("Invalid batch configuration")?;

    tracing::info!(
        api_url = %config.api_url,
        poll_mode = %config.poll_mode,
        company_id = batch.request.company_id,
        auto_commit = batch.auto_commit,
        "Starting outreach-monitor",
    );

    let api = Arc::new(
        GenerationApi::with_timeout(
            config.api_url.clone(),
            Credentials::from_token(config.api_token.clone()),
            config.request_timeout,
        )
        .context("Failed to build HTTP client")?,
    );
    let sink = Arc::new(CompanyOutbox::new(
        Arc::clone(&api),
        batch.request.company_id,
    ));

    let event_tx = events::channel();
    let mut event_rx = event_tx.subscribe();

    let tracker = BatchTracker::submit(
        api.as_ref(),
        &batch.request,
        api.clone(),
        sink,
        event_tx.clone(),
        config.tracker_options(),
    )
    .await
    .context("Failed to start generation batch")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let done = tracker.wait_until_done();
    tokio::pin!(done);

    let finished = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping");
                break false;
            }
            finished = &mut done => break finished,
            received = event_rx.recv() => match received {
                Ok(event) => handle_event(&tracker, &event, batch.auto_commit).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event listener lagged, some events were skipped");
                }
                Err(RecvError::Closed) => break false,
            },
        }
    };

    if finished && batch.auto_commit {
        for (job_id, outcome) in tracker.commit_all().await {
            if let Err(e) = outcome {
                tracing::error!(job_id = %job_id, error = %e, "Result left uncommitted");
            }
        }
    }

    let snapshot = tracker.snapshot();
    let results = tracker.results().await;
    tracing::info!(
        finished,
        aggregate_percent = snapshot.aggregate_percent,
        generated = results.completed,
        total = results.total,
        committed = results.committed(),
        "Batch tracking finished",
    );

    tracker.shutdown().await;
    Ok(())
}

/// Log one event and, with auto-commit on, save results as they arrive.
async fn handle_event(tracker: &BatchTracker, event: &MonitorEvent, auto_commit: bool) {
    if let Ok(payload) = serde_json::to_string(event) {
        tracing::debug!(event = event.event_type(), %payload, "Monitor event");
    }

    match event {
        MonitorEvent::JobProgress {
            job_id,
            percent,
            message,
        } => {
            tracing::info!(job_id = %job_id, percent, message = %message, "Job progress");
        }
        MonitorEvent::JobFailed { job_id, error } => {
            tracing::warn!(
                job_id = %job_id,
                error = error.as_deref().unwrap_or("unknown error"),
                "Job failed",
            );
        }
        MonitorEvent::ResultReady { job_id, target_url } => {
            tracing::info!(job_id = %job_id, target_url = %target_url, "Email generated");
            if auto_commit {
                // commit_all retries whatever is left uncommitted.
                if let Err(e) = tracker.commit(job_id).await {
                    tracing::debug!(job_id = %job_id, error = %e, "Auto-commit failed, will retry at the end");
                }
            }
        }
        MonitorEvent::PollError {
            consecutive_errors,
            message,
            ..
        } => {
            tracing::warn!(consecutive_errors, message = %message, "Status polling is backing off");
        }
        MonitorEvent::BatchDone {
            aggregate_percent,
            completed,
            failed,
        } => {
            tracing::info!(aggregate_percent, completed, failed, "All jobs finished");
        }
        MonitorEvent::JobCompleted { .. }
        | MonitorEvent::ResultCommitted { .. }
        | MonitorEvent::RoundScheduled { .. } => {}
    }
}
