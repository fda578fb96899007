//! Lifecycle events emitted while a batch is tracked.
//!
//! Events are published on a [`tokio::sync::broadcast`] channel; call
//! `BatchTracker::subscribe` (or pass a sender to the components
//! directly) to receive them. Sending never blocks and is silently
//! dropped when nobody listens.

use serde::Serialize;
use tokio::sync::broadcast;

use outreach_core::job_events::{
    EVENT_BATCH_DONE, EVENT_JOB_COMPLETED, EVENT_JOB_FAILED, EVENT_JOB_PROGRESS,
    EVENT_POLL_ERROR, EVENT_RESULT_COMMITTED, EVENT_RESULT_READY, EVENT_ROUND_SCHEDULED,
};
use outreach_core::types::JobId;

/// Broadcast channel capacity for monitor events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A state change observed by the monitor or the result aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A job reported new progress.
    JobProgress {
        job_id: JobId,
        /// Completion percentage (0-100).
        percent: u8,
        message: String,
    },

    /// A job reached `completed`.
    JobCompleted { job_id: JobId, has_payload: bool },

    /// A job reached `failed`.
    JobFailed {
        job_id: JobId,
        error: Option<String>,
    },

    /// A completed job's draft is now available as a result entry.
    ResultReady { job_id: JobId, target_url: String },

    /// A result entry was saved.
    ResultCommitted { job_id: JobId },

    /// A polling round hit a transient status-query error.
    PollError {
        consecutive_errors: u32,
        failed_queries: usize,
        message: String,
    },

    /// The next polling round was scheduled after `delay_ms`.
    RoundScheduled { round: u64, delay_ms: u64 },

    /// Every job reached a terminal phase; polling has stopped.
    BatchDone {
        aggregate_percent: u8,
        completed: usize,
        failed: usize,
    },
}

impl MonitorEvent {
    /// Stable discriminator, identical to the serialized `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobProgress { .. } => EVENT_JOB_PROGRESS,
            Self::JobCompleted { .. } => EVENT_JOB_COMPLETED,
            Self::JobFailed { .. } => EVENT_JOB_FAILED,
            Self::ResultReady { .. } => EVENT_RESULT_READY,
            Self::ResultCommitted { .. } => EVENT_RESULT_COMMITTED,
            Self::PollError { .. } => EVENT_POLL_ERROR,
            Self::RoundScheduled { .. } => EVENT_ROUND_SCHEDULED,
            Self::BatchDone { .. } => EVENT_BATCH_DONE,
        }
    }
}

/// Create a sender with the default capacity.
pub fn channel() -> broadcast::Sender<MonitorEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Publish an event, ignoring the error that only means zero receivers.
pub(crate) fn emit(tx: &broadcast::Sender<MonitorEvent>, event: MonitorEvent) {
    let _ = tx.send(event);
}
