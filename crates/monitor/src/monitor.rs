//! Progress monitor: the polling loop over a fixed batch of jobs.
//!
//! [`ProgressMonitor::start`] spawns one coordinating task. Each round it
//! queries every still-active job concurrently, waits for all queries,
//! merges the results into the cached statuses and publishes one new
//! [`ProgressSnapshot`] on a [`watch`] channel, so readers never see a
//! partially applied round. Polling stops on its own once every job is
//! terminal, or when [`ProgressMonitor::stop`] cancels the token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use outreach_core::job::{JobHandle, JobPhase, JobStatus, Transition};
use outreach_core::progress::aggregate_percent;
use outreach_core::types::{JobId, Timestamp};

use crate::error::ServiceError;
use crate::events::{emit, MonitorEvent};
use crate::policy::PollPolicy;
use crate::service::StatusSource;

/// How long [`ProgressMonitor::shutdown`] waits for the loop to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One job as seen by snapshot readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub handle: JobHandle,
    pub status: JobStatus,
}

/// Read-only view of the whole batch after the latest round.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// Per-job status, in batch order.
    pub jobs: Vec<JobView>,
    pub aggregate_percent: u8,
    /// Every job reached a terminal phase and polling has stopped.
    pub is_done: bool,
    /// Number of polling rounds issued so far.
    pub round: u64,
    /// Consecutive rounds that hit a transient query error.
    pub consecutive_errors: u32,
    /// Message of the latest transient error, cleared by a clean round.
    pub last_error: Option<String>,
    /// Delay before the next round, if one is scheduled.
    pub next_delay_ms: Option<u64>,
    pub updated_at: Timestamp,
}

impl ProgressSnapshot {
    pub fn status(&self, job_id: &str) -> Option<&JobStatus> {
        self.jobs
            .iter()
            .find(|v| v.handle.job_id == job_id)
            .map(|v| &v.status)
    }

    pub fn count_in(&self, phase: JobPhase) -> usize {
        self.jobs.iter().filter(|v| v.status.phase == phase).count()
    }
}

/// Handle to a running polling loop.
///
/// Dropping the handle does not stop the loop; call [`stop`](Self::stop)
/// or [`shutdown`](Self::shutdown).
pub struct ProgressMonitor {
    snapshot_rx: watch::Receiver<ProgressSnapshot>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressMonitor {
    /// Start polling `jobs`. The first round is issued immediately.
    ///
    /// `cancel` stops the loop; pass a child of a wider token to tie the
    /// monitor's lifetime to it.
    pub fn start(
        jobs: Vec<JobHandle>,
        source: Arc<dyn StatusSource>,
        policy: PollPolicy,
        event_tx: broadcast::Sender<MonitorEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let state = MonitorState::new(jobs);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            run_polling_loop(state, source, policy, snapshot_tx, event_tx, loop_cancel).await;
        });

        Self {
            snapshot_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Live view that changes once per round.
    pub fn watch(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Cancel the scheduled next round. A round already in flight is
    /// allowed to finish; its results are discarded.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until every job is terminal.
    ///
    /// Returns `false` if the monitor was stopped first.
    pub async fn wait_until_done(&self) -> bool {
        let mut rx = self.snapshot_rx.clone();
        let done = rx.wait_for(|s| s.is_done).await.is_ok();
        done
    }

    /// Stop the loop and wait for its task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        if let Some(task) = self.task.lock().await.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Progress monitor did not exit within the shutdown timeout");
            }
        }
    }
}

/// Mutable polling state, owned by the loop task.
struct MonitorState {
    jobs: Vec<JobHandle>,
    statuses: HashMap<JobId, JobStatus>,
    round: u64,
    consecutive_errors: u32,
    last_error: Option<String>,
    next_delay: Option<Duration>,
    is_done: bool,
}

impl MonitorState {
    fn new(jobs: Vec<JobHandle>) -> Self {
        let statuses = jobs
            .iter()
            .map(|h| (h.job_id.clone(), JobStatus::pending()))
            .collect();
        Self {
            jobs,
            statuses,
            round: 0,
            consecutive_errors: 0,
            last_error: None,
            next_delay: None,
            is_done: false,
        }
    }

    fn status(&self, job_id: &str) -> Option<&JobStatus> {
        self.statuses.get(job_id)
    }

    /// Jobs whose cached phase is not terminal.
    fn active_handles(&self) -> Vec<JobHandle> {
        self.jobs
            .iter()
            .filter(|h| !self.status(&h.job_id).is_some_and(JobStatus::is_terminal))
            .cloned()
            .collect()
    }

    fn count_in(&self, phase: JobPhase) -> usize {
        self.jobs
            .iter()
            .filter(|h| self.status(&h.job_id).is_some_and(|s| s.phase == phase))
            .count()
    }

    fn aggregate_percent(&self) -> u8 {
        let statuses = self.jobs.iter().filter_map(|h| self.status(&h.job_id));
        aggregate_percent(statuses, self.jobs.len())
    }

    /// Merge one observed status, emitting events for visible changes.
    fn apply(
        &mut self,
        handle: &JobHandle,
        observed: JobStatus,
        event_tx: &broadcast::Sender<MonitorEvent>,
    ) {
        let Some(cached) = self.statuses.get_mut(&handle.job_id) else {
            return;
        };
        let before = cached.progress.clone();

        match cached.observe(observed) {
            Transition::Rejected => return,
            Transition::Advanced { from, to } => {
                tracing::info!(
                    job_id = %handle.job_id,
                    target_url = %handle.target_url,
                    from = %from,
                    to = %to,
                    "Job phase advanced",
                );
                match to {
                    JobPhase::Completed => emit(
                        event_tx,
                        MonitorEvent::JobCompleted {
                            job_id: handle.job_id.clone(),
                            has_payload: cached.payload().is_some(),
                        },
                    ),
                    JobPhase::Failed => emit(
                        event_tx,
                        MonitorEvent::JobFailed {
                            job_id: handle.job_id.clone(),
                            error: cached.error.clone(),
                        },
                    ),
                    JobPhase::Pending | JobPhase::Running => {}
                }
            }
            Transition::Updated => {}
        }

        if cached.progress != before {
            if let Some(progress) = &cached.progress {
                emit(
                    event_tx,
                    MonitorEvent::JobProgress {
                        job_id: handle.job_id.clone(),
                        percent: progress.percent,
                        message: progress.message.clone(),
                    },
                );
            }
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let jobs = self
            .jobs
            .iter()
            .map(|h| JobView {
                handle: h.clone(),
                status: self.status(&h.job_id).cloned().unwrap_or_default(),
            })
            .collect();

        ProgressSnapshot {
            jobs,
            aggregate_percent: self.aggregate_percent(),
            is_done: self.is_done,
            round: self.round,
            consecutive_errors: self.consecutive_errors,
            last_error: self.last_error.clone(),
            next_delay_ms: self.next_delay.map(|d| d.as_millis() as u64),
            updated_at: Utc::now(),
        }
    }
}

/// Core polling loop: query active jobs -> apply round -> sleep.
///
/// Runs until every job is terminal or `cancel` is triggered.
async fn run_polling_loop(
    mut state: MonitorState,
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
    snapshot_tx: watch::Sender<ProgressSnapshot>,
    event_tx: broadcast::Sender<MonitorEvent>,
    cancel: CancellationToken,
) {
    let job_count = state.jobs.len();
    tracing::info!(job_count, "Progress monitor started");

    loop {
        let active = state.active_handles();
        if active.is_empty() {
            finish(&mut state, &snapshot_tx, &event_tx);
            return;
        }

        state.round += 1;
        tracing::debug!(round = state.round, active = active.len(), "Polling job statuses");

        let outcomes = join_all(active.iter().map(|h| source.fetch_status(h))).await;

        if cancel.is_cancelled() {
            tracing::debug!(round = state.round, "Monitor stopped, discarding round");
            return;
        }

        let mut failures: Vec<(&JobHandle, ServiceError)> = Vec::new();
        for (handle, outcome) in active.iter().zip(outcomes) {
            match outcome {
                Ok(observed) => state.apply(handle, observed, &event_tx),
                Err(e) => failures.push((handle, e)),
            }
        }

        let delay = if failures.is_empty() {
            state.consecutive_errors = 0;
            state.last_error = None;
            policy.interval(job_count)
        } else {
            state.consecutive_errors += 1;
            for (handle, e) in &failures {
                tracing::warn!(
                    job_id = %handle.job_id,
                    round = state.round,
                    error = %e,
                    "Status query failed, will retry",
                );
            }
            let message = failures[0].1.to_string();
            emit(
                &event_tx,
                MonitorEvent::PollError {
                    consecutive_errors: state.consecutive_errors,
                    failed_queries: failures.len(),
                    message: message.clone(),
                },
            );
            state.last_error = Some(message);
            policy.backoff(state.consecutive_errors)
        };

        if state.active_handles().is_empty() {
            finish(&mut state, &snapshot_tx, &event_tx);
            return;
        }

        state.next_delay = Some(delay);
        snapshot_tx.send_replace(state.snapshot());
        emit(
            &event_tx,
            MonitorEvent::RoundScheduled {
                round: state.round,
                delay_ms: delay.as_millis() as u64,
            },
        );
        tracing::debug!(
            round = state.round,
            delay_ms = delay.as_millis() as u64,
            aggregate_percent = state.aggregate_percent(),
            "Next polling round scheduled",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(round = state.round, "Progress monitor stopped");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Publish the terminal snapshot and the batch-done event.
fn finish(
    state: &mut MonitorState,
    snapshot_tx: &watch::Sender<ProgressSnapshot>,
    event_tx: &broadcast::Sender<MonitorEvent>,
) {
    state.is_done = true;
    state.next_delay = None;
    let snapshot = state.snapshot();
    let completed = state.count_in(JobPhase::Completed);
    let failed = state.count_in(JobPhase::Failed);

    tracing::info!(
        rounds = state.round,
        completed,
        failed,
        aggregate_percent = snapshot.aggregate_percent,
        "All jobs reached a terminal phase",
    );

    emit(
        event_tx,
        MonitorEvent::BatchDone {
            aggregate_percent: snapshot.aggregate_percent,
            completed,
            failed,
        },
    );
    snapshot_tx.send_replace(snapshot);
}
