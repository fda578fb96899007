//! Per-job state model and its forward-only state machine.
//!
//! ```text
//! pending --> running --> completed
//!    |           |
//!    +-----------+------> failed
//! ```
//!
//! `completed` and `failed` are terminal. [`JobStatus::observe`] is the
//! single place where a freshly polled status is merged into the cached
//! one; it refuses regressions and any change to a terminal job.

use serde::{Deserialize, Serialize};

use crate::email::EmailDraft;
use crate::types::JobId;

/// Identifies one submitted job plus the target URL that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub target_url: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<JobId>, target_url: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            target_url: target_url.into(),
        }
    }
}

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobPhase {
    /// `completed` and `failed` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress reported by a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Completion percentage, always within `0..=100`.
    pub percent: u8,
    pub message: String,
}

impl ProgressRecord {
    /// Build a record from a raw reported percentage, clamping it into
    /// `0..=100`. Non-finite values count as 0.
    pub fn new(percent: f64, message: impl Into<String>) -> Self {
        let percent = if percent.is_finite() {
            percent.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        Self {
            percent,
            message: message.into(),
        }
    }
}

/// Latest known state of a single job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub phase: JobPhase,
    pub progress: Option<ProgressRecord>,
    /// Result payload, present once the job reports `completed`.
    pub result: Option<EmailDraft>,
    /// Failure reason reported by a `failed` job.
    pub error: Option<String>,
}

/// Outcome of merging an observed status into the cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The observation was dropped: the job is already terminal or the
    /// observed phase would move it backwards.
    Rejected,
    /// Same phase; progress details may have changed.
    Updated,
    /// The phase moved forward.
    Advanced { from: JobPhase, to: JobPhase },
}

impl JobStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn running(percent: f64, message: impl Into<String>) -> Self {
        Self {
            phase: JobPhase::Running,
            progress: Some(ProgressRecord::new(percent, message)),
            ..Self::default()
        }
    }

    pub fn completed(result: EmailDraft) -> Self {
        Self {
            phase: JobPhase::Completed,
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            phase: JobPhase::Failed,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Attach a progress record (builder style).
    pub fn with_progress(mut self, percent: f64, message: impl Into<String>) -> Self {
        self.progress = Some(ProgressRecord::new(percent, message));
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The non-empty result payload, if the job completed with one.
    pub fn payload(&self) -> Option<&EmailDraft> {
        match self.phase {
            JobPhase::Completed => self.result.as_ref().filter(|r| !r.is_empty()),
            _ => None,
        }
    }

    /// Merge a freshly observed status into this cached one.
    ///
    /// A missing progress record in the observation keeps the cached one.
    pub fn observe(&mut self, observed: JobStatus) -> Transition {
        if self.phase.is_terminal() || observed.phase.rank() < self.phase.rank() {
            return Transition::Rejected;
        }

        let from = self.phase;
        self.phase = observed.phase;
        if observed.progress.is_some() {
            self.progress = observed.progress;
        }
        if observed.result.is_some() {
            self.result = observed.result;
        }
        if observed.error.is_some() {
            self.error = observed.error;
        }

        if from == self.phase {
            Transition::Updated
        } else {
            Transition::Advanced {
                from,
                to: self.phase,
            }
        }
    }
}
