//! Batch tracker: one progress monitor and one result aggregator driven
//! together for a submitted batch.
//!
//! In [`PollMode::Shared`] only the monitor queries the status endpoint;
//! an observer task forwards every published snapshot to the aggregator.
//! Jobs that finished without a usable draft are then fetched by the
//! aggregator itself every `result_interval` until they settle.
//! In [`PollMode::Dual`] the aggregator also runs its own fixed-interval
//! fetch loop. Either way [`BatchTracker::stop`] cancels everything
//! through a single [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use outreach_core::job::JobHandle;
use outreach_core::request::GenerationRequest;
use outreach_core::types::JobId;

use crate::aggregator::{CommitOutcome, ResultAggregator, ResultsView};
use crate::config::PollMode;
use crate::error::{CommitError, TrackerError};
use crate::events::MonitorEvent;
use crate::monitor::{ProgressMonitor, ProgressSnapshot};
use crate::policy::PollPolicy;
use crate::service::{BatchSubmitter, ResultSink, StatusSource};

/// Default period of the aggregator's own fetch loop.
pub const DEFAULT_RESULT_INTERVAL: Duration = Duration::from_millis(8000);

const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub mode: PollMode,
    pub policy: PollPolicy,
    /// Period of the aggregator's loop. In shared mode it only runs once
    /// the batch is done and some job still lacks a result.
    pub result_interval: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            mode: PollMode::Shared,
            policy: PollPolicy::default(),
            result_interval: DEFAULT_RESULT_INTERVAL,
        }
    }
}

pub struct BatchTracker {
    jobs: Vec<JobHandle>,
    mode: PollMode,
    monitor: ProgressMonitor,
    aggregator: Arc<ResultAggregator>,
    event_tx: broadcast::Sender<MonitorEvent>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchTracker {
    /// Validate `request`, submit it and start tracking the returned jobs.
    pub async fn submit(
        submitter: &dyn BatchSubmitter,
        request: &GenerationRequest,
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn ResultSink>,
        event_tx: broadcast::Sender<MonitorEvent>,
        options: TrackerOptions,
    ) -> Result<Self, TrackerError> {
        let targets = request.validate()?;
        tracing::info!(
            company_id = request.company_id,
            targets = targets.len(),
            tone = ?request.tone,
            "Submitting generation batch",
        );

        let jobs = submitter.submit(request).await?;
        if jobs.is_empty() {
            return Err(TrackerError::EmptyBatch);
        }
        tracing::info!(job_count = jobs.len(), "Generation batch accepted");

        Ok(Self::start(jobs, source, sink, event_tx, options))
    }

    /// Start tracking an already submitted batch.
    ///
    /// Events go to `event_tx`; subscribe to it before calling to see the
    /// first round.
    pub fn start(
        jobs: Vec<JobHandle>,
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn ResultSink>,
        event_tx: broadcast::Sender<MonitorEvent>,
        options: TrackerOptions,
    ) -> Self {
        let cancel = CancellationToken::new();
        let monitor = ProgressMonitor::start(
            jobs.clone(),
            Arc::clone(&source),
            options.policy.clone(),
            event_tx.clone(),
            cancel.child_token(),
        );
        let aggregator = Arc::new(ResultAggregator::new(
            jobs.clone(),
            source,
            sink,
            event_tx.clone(),
        ));

        let task = match options.mode {
            PollMode::Shared => spawn_observer(
                monitor.watch(),
                Arc::clone(&aggregator),
                options.result_interval,
                cancel.child_token(),
            ),
            PollMode::Dual => Arc::clone(&aggregator)
                .spawn_polling(options.result_interval, cancel.child_token()),
        };
        tracing::debug!(mode = %options.mode, job_count = jobs.len(), "Batch tracking started");

        Self {
            jobs,
            mode: options.mode,
            monitor,
            aggregator,
            event_tx,
            cancel,
            tasks: Mutex::new(vec![task]),
        }
    }

    pub fn jobs(&self) -> &[JobHandle] {
        &self.jobs
    }

    pub fn mode(&self) -> PollMode {
        self.mode
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.monitor.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<ProgressSnapshot> {
        self.monitor.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    pub async fn results(&self) -> ResultsView {
        self.aggregator.results().await
    }

    pub async fn commit(&self, job_id: &str) -> Result<CommitOutcome, CommitError> {
        self.aggregator.commit(job_id).await
    }

    /// Commit every uncommitted result concurrently.
    pub async fn commit_all(&self) -> Vec<(JobId, Result<CommitOutcome, CommitError>)> {
        let pending: Vec<JobId> = self
            .results()
            .await
            .entries
            .into_iter()
            .filter(|e| !e.committed)
            .map(|e| e.handle.job_id)
            .collect();

        let outcomes = join_all(pending.iter().map(|id| self.aggregator.commit(id))).await;
        pending.into_iter().zip(outcomes).collect()
    }

    /// Wait until every job is terminal, then make sure the aggregator has
    /// seen the final statuses.
    ///
    /// Returns `false` if tracking was stopped first.
    pub async fn wait_until_done(&self) -> bool {
        if !self.monitor.wait_until_done().await {
            return false;
        }
        match self.mode {
            PollMode::Shared => {
                self.aggregator.ingest(&self.monitor.snapshot().jobs).await;
            }
            PollMode::Dual => {
                self.aggregator.poll(&self.jobs).await;
            }
        }
        true
    }

    /// Cancel the monitor and the aggregator loop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for every background task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        self.monitor.shutdown().await;

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Tracker task did not exit within the shutdown timeout");
            }
        }
        tracing::debug!("Batch tracking shut down");
    }
}

/// Forward every published snapshot to the aggregator until the batch is
/// done or tracking is cancelled.
///
/// Once the batch is done, jobs still without a result are re-fetched every
/// `result_interval` until the aggregator is settled.
fn spawn_observer(
    mut snapshots: watch::Receiver<ProgressSnapshot>,
    aggregator: Arc<ResultAggregator>,
    result_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // A round published before this task ran is still forwarded.
        snapshots.mark_changed();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            let snapshot = snapshots.borrow_and_update().clone();
            let created = aggregator.ingest(&snapshot.jobs).await;
            if created > 0 {
                tracing::debug!(round = snapshot.round, created, "Results taken from monitor round");
            }
            if snapshot.is_done {
                if !aggregator.is_settled().await {
                    tracing::info!("Batch done with results missing, fetching them directly");
                    aggregator.run_polling(result_interval, cancel).await;
                }
                return;
            }
        }
    })
}
