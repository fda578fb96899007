//! Scripted in-memory collaborators shared by the monitor integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use outreach_core::email::EmailDraft;
use outreach_core::job::{JobHandle, JobStatus};
use outreach_core::request::GenerationRequest;
use outreach_core::types::JobId;
use outreach_monitor::error::ServiceError;
use outreach_monitor::service::{BatchSubmitter, ResultSink, StatusSource};

pub type Step = Result<JobStatus, ServiceError>;

/// `job1..=jobN`, each with its own target URL.
pub fn handles(n: usize) -> Vec<JobHandle> {
    (1..=n)
        .map(|i| JobHandle::new(format!("job{i}"), format!("https://target{i}.com")))
        .collect()
}

pub fn draft(company: &str) -> EmailDraft {
    EmailDraft {
        subject: format!("Partnership with {company}"),
        body: format!("Dear {company} team,\n\nWe would love to work with you."),
        target_company_name: Some(company.to_string()),
        target_url: format!("https://{}.com", company.to_lowercase()),
        contact_info: None,
    }
}

pub fn transient() -> ServiceError {
    ServiceError::Transport("connection reset by peer".into())
}

/// Status source that replays a per-job script.
///
/// Once a job's script runs out its last step is repeated; unscripted
/// jobs report `pending`. Every call is recorded with the (tokio) time
/// elapsed since the source was created.
pub struct ScriptedSource {
    scripts: Mutex<HashMap<JobId, VecDeque<Step>>>,
    last: Mutex<HashMap<JobId, Step>>,
    calls: Mutex<Vec<(JobId, Duration)>>,
    started: Instant,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every query takes `delay` to answer.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            last: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            started: Instant::now(),
            delay,
        }
    }

    pub fn script(self, job_id: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), steps.into());
        self
    }

    pub fn calls_for(&self, job_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Milliseconds since creation at which `job_id` was queried.
    pub fn call_times_ms(&self, job_id: &str) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, at)| at.as_millis() as u64)
            .collect()
    }

    fn next_step(&self, job_id: &str) -> Step {
        let popped = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front);

        let mut last = self.last.lock().unwrap();
        match popped {
            Some(step) => {
                last.insert(job_id.to_string(), step.clone());
                step
            }
            None => last
                .get(job_id)
                .cloned()
                .unwrap_or_else(|| Ok(JobStatus::pending())),
        }
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((handle.job_id.clone(), self.started.elapsed()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next_step(&handle.job_id)
    }
}

/// Result sink that records every call and can be told to fail.
pub struct RecordingSink {
    calls: Mutex<Vec<JobId>>,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    /// Reject the next `n` commits.
    pub fn failing(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<JobId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, job_id: &str) -> usize {
        self.calls().iter().filter(|id| *id == job_id).count()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn commit_result(
        &self,
        handle: &JobHandle,
        _payload: &EmailDraft,
    ) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(handle.job_id.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ServiceError::Rejected {
                status: 500,
                detail: "An error occurred".into(),
            });
        }
        Ok(())
    }
}

/// Submitter returning a fixed outcome and counting calls.
pub struct FakeSubmitter {
    outcome: Result<Vec<JobHandle>, ServiceError>,
    calls: AtomicUsize,
}

impl FakeSubmitter {
    pub fn returning(jobs: Vec<JobHandle>) -> Self {
        Self {
            outcome: Ok(jobs),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: ServiceError) -> Self {
        Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchSubmitter for FakeSubmitter {
    async fn submit(&self, _request: &GenerationRequest) -> Result<Vec<JobHandle>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
