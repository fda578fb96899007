//! Result aggregator: collects finished drafts and commits them at most
//! once per job.
//!
//! Entries are created the first time a job is observed `completed` with
//! a non-empty draft, either by the aggregator's own [`poll`] rounds or
//! from statuses handed over by the progress monitor through
//! [`ingest`]. Commits are serialized per job by a keyed async lock so
//! concurrent callers never reach the sink twice for the same job.
//!
//! [`poll`]: ResultAggregator::poll
//! [`ingest`]: ResultAggregator::ingest

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use outreach_core::email::EmailDraft;
use outreach_core::job::{JobHandle, JobPhase, JobStatus};
use outreach_core::types::JobId;

use crate::error::CommitError;
use crate::events::{emit, MonitorEvent};
use crate::monitor::JobView;
use crate::service::{ResultSink, StatusSource};

/// A finished job's draft plus its commit flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultEntry {
    pub handle: JobHandle,
    pub payload: EmailDraft,
    /// Set once by a successful commit, never reverted.
    pub committed: bool,
}

/// Successful outcomes of [`ResultAggregator::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call saved the result.
    Committed,
    /// An earlier call already saved it; nothing was sent.
    AlreadyCommitted,
    /// No result exists for the job yet; nothing was sent.
    NoResult,
}

/// Read snapshot of the aggregated results.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsView {
    /// Entries in batch order.
    pub entries: Vec<ResultEntry>,
    /// Jobs with a result entry.
    pub completed: usize,
    /// Jobs in the batch.
    pub total: usize,
}

impl ResultsView {
    pub fn get(&self, job_id: &str) -> Option<&ResultEntry> {
        self.entries.iter().find(|e| e.handle.job_id == job_id)
    }

    pub fn committed(&self) -> usize {
        self.entries.iter().filter(|e| e.committed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct AggregatorState {
    entries: HashMap<JobId, ResultEntry>,
    /// Jobs observed `failed`; they never produce a result.
    failed: HashSet<JobId>,
}

impl AggregatorState {
    fn needs_fetch(&self, job_id: &str) -> bool {
        if self.failed.contains(job_id) {
            return false;
        }
        self.entries
            .get(job_id)
            .map_or(true, |entry| entry.payload.is_empty())
    }

    /// Merge one observed status. Returns `true` when a new entry was
    /// created.
    fn absorb(
        &mut self,
        handle: &JobHandle,
        status: &JobStatus,
        event_tx: &broadcast::Sender<MonitorEvent>,
    ) -> bool {
        match status.phase {
            JobPhase::Failed => {
                self.failed.insert(handle.job_id.clone());
                false
            }
            JobPhase::Completed => {
                let Some(payload) = status.payload() else {
                    tracing::debug!(job_id = %handle.job_id, "Completed job has no draft yet");
                    return false;
                };

                let committed = self
                    .entries
                    .get(&handle.job_id)
                    .is_some_and(|entry| entry.committed);
                let previous = self.entries.insert(
                    handle.job_id.clone(),
                    ResultEntry {
                        handle: handle.clone(),
                        payload: payload.clone(),
                        committed,
                    },
                );

                tracing::info!(
                    job_id = %handle.job_id,
                    target_url = %handle.target_url,
                    company = payload.company_name(),
                    "Result ready",
                );
                emit(
                    event_tx,
                    MonitorEvent::ResultReady {
                        job_id: handle.job_id.clone(),
                        target_url: handle.target_url.clone(),
                    },
                );
                previous.is_none()
            }
            JobPhase::Pending | JobPhase::Running => false,
        }
    }
}

/// Owns the result entries for one batch.
pub struct ResultAggregator {
    jobs: Vec<JobHandle>,
    source: Arc<dyn StatusSource>,
    sink: Arc<dyn ResultSink>,
    event_tx: broadcast::Sender<MonitorEvent>,
    state: RwLock<AggregatorState>,
    /// Serializes fetch rounds so only one applies its results at a time.
    round_lock: Mutex<()>,
    commit_locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl ResultAggregator {
    pub fn new(
        jobs: Vec<JobHandle>,
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn ResultSink>,
        event_tx: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            jobs,
            source,
            sink,
            event_tx,
            state: RwLock::new(AggregatorState::default()),
            round_lock: Mutex::new(()),
            commit_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn jobs(&self) -> &[JobHandle] {
        &self.jobs
    }

    /// Run one fetch round over `jobs`.
    ///
    /// Only jobs without a result (and not known to have failed) are
    /// queried, concurrently. Query errors are logged and retried on the
    /// next round. Returns the number of new entries.
    pub async fn poll(&self, jobs: &[JobHandle]) -> usize {
        let _round = self.round_lock.lock().await;

        let pending: Vec<&JobHandle> = {
            let state = self.state.read().await;
            jobs.iter().filter(|h| state.needs_fetch(&h.job_id)).collect()
        };
        if pending.is_empty() {
            return 0;
        }

        let outcomes = join_all(pending.iter().map(|h| self.source.fetch_status(h))).await;

        let mut state = self.state.write().await;
        let mut created = 0;
        for (handle, outcome) in pending.into_iter().zip(outcomes) {
            match outcome {
                Ok(status) => {
                    if state.absorb(handle, &status, &self.event_tx) {
                        created += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %handle.job_id, error = %e, "Result fetch failed");
                }
            }
        }
        created
    }

    /// Apply statuses observed by someone else's polling round, using the
    /// same rules as [`poll`](Self::poll). Returns the number of new
    /// entries.
    pub async fn ingest(&self, views: &[JobView]) -> usize {
        let _round = self.round_lock.lock().await;
        let mut state = self.state.write().await;

        let mut created = 0;
        for view in views {
            if !state.needs_fetch(&view.handle.job_id) {
                continue;
            }
            if state.absorb(&view.handle, &view.status, &self.event_tx) {
                created += 1;
            }
        }
        created
    }

    /// Current entries, in batch order.
    pub async fn results(&self) -> ResultsView {
        let state = self.state.read().await;
        let entries: Vec<ResultEntry> = self
            .jobs
            .iter()
            .filter_map(|h| state.entries.get(&h.job_id).cloned())
            .collect();
        ResultsView {
            completed: entries.len(),
            total: self.jobs.len(),
            entries,
        }
    }

    /// Every job either has a result or is known to have failed.
    pub async fn is_settled(&self) -> bool {
        let state = self.state.read().await;
        self.jobs.iter().all(|h| !state.needs_fetch(&h.job_id))
    }

    /// Save the result of `job_id` through the sink, at most once.
    ///
    /// Already-committed entries and jobs without a result succeed without
    /// calling the sink. On failure the entry stays uncommitted.
    pub async fn commit(&self, job_id: &str) -> Result<CommitOutcome, CommitError> {
        if !self.state.read().await.entries.contains_key(job_id) {
            return Ok(CommitOutcome::NoResult);
        }
        let lock = self.commit_lock(job_id).await;
        let _guard = lock.lock().await;

        let entry = {
            let state = self.state.read().await;
            match state.entries.get(job_id) {
                None => return Ok(CommitOutcome::NoResult),
                Some(entry) if entry.committed => return Ok(CommitOutcome::AlreadyCommitted),
                Some(entry) => entry.clone(),
            }
        };

        if let Err(source) = self.sink.commit_result(&entry.handle, &entry.payload).await {
            tracing::error!(job_id, error = %source, "Failed to commit result");
            return Err(CommitError::Rejected {
                job_id: job_id.to_string(),
                source,
            });
        }

        if let Some(stored) = self.state.write().await.entries.get_mut(job_id) {
            stored.committed = true;
        }
        tracing::info!(job_id, target_url = %entry.handle.target_url, "Result committed");
        emit(
            &self.event_tx,
            MonitorEvent::ResultCommitted {
                job_id: job_id.to_string(),
            },
        );
        Ok(CommitOutcome::Committed)
    }

    /// Spawn [`run_polling`](Self::run_polling) as a background task.
    pub fn spawn_polling(
        self: Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_polling(period, cancel).await })
    }

    /// Fetch the batch every `period` until every job is settled.
    ///
    /// The first round runs immediately. Returns when `cancel` fires or
    /// no job needs another fetch.
    pub async fn run_polling(&self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Result polling stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let created = self.poll(&self.jobs).await;
            if created > 0 {
                tracing::debug!(created, "Result round produced new entries");
            }
            if self.is_settled().await {
                tracing::info!("All results collected, result polling finished");
                return;
            }
        }
    }

    /// Only called for jobs that have an entry, so the map stays bounded by
    /// the batch.
    async fn commit_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.commit_locks.lock().await;
        Arc::clone(locks.entry(job_id.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::ServiceError;
    use crate::events;

    struct Finished;

    #[async_trait]
    impl StatusSource for Finished {
        async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError> {
            Ok(JobStatus::completed(EmailDraft {
                subject: format!("Hello from {}", handle.job_id),
                body: "Body".into(),
                ..Default::default()
            }))
        }
    }

    struct Accepting;

    #[async_trait]
    impl ResultSink for Accepting {
        async fn commit_result(&self, _: &JobHandle, _: &EmailDraft) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn aggregator(n: usize) -> ResultAggregator {
        let jobs = (1..=n)
            .map(|i| JobHandle::new(format!("job{i}"), format!("https://t{i}.com")))
            .collect();
        ResultAggregator::new(jobs, Arc::new(Finished), Arc::new(Accepting), events::channel())
    }

    #[tokio::test]
    async fn commit_without_entry_allocates_no_lock() {
        let agg = aggregator(1);

        assert_eq!(agg.commit("job1").await.unwrap(), CommitOutcome::NoResult);
        assert_eq!(agg.commit("not-in-batch").await.unwrap(), CommitOutcome::NoResult);
        assert!(agg.commit_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn commit_locks_only_cover_jobs_with_results() {
        let agg = aggregator(2);
        agg.poll(&agg.jobs[..1]).await;

        assert_eq!(agg.commit("job1").await.unwrap(), CommitOutcome::Committed);
        assert_eq!(agg.commit("job2").await.unwrap(), CommitOutcome::NoResult);
        assert_eq!(agg.commit("ghost").await.unwrap(), CommitOutcome::NoResult);

        let locks = agg.commit_locks.lock().await;
        assert_eq!(locks.keys().collect::<Vec<_>>(), vec!["job1"]);
    }
}
