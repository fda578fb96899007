//! Wire formats of the generation backend and their mapping onto the
//! core job model.

use serde::{Deserialize, Serialize};

use outreach_core::email::EmailDraft;
use outreach_core::job::{JobHandle, JobPhase, JobStatus, ProgressRecord};
use outreach_core::types::JobId;

/// One started job as returned by the submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRef {
    pub url: String,
    pub task_id: JobId,
}

/// Response of `POST /tasks/generate-emails`.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub tasks: Vec<TaskRef>,
}

impl SubmitResponse {
    pub fn into_handles(self) -> Vec<JobHandle> {
        self.tasks
            .into_iter()
            .map(|t| JobHandle::new(t.task_id, t.url))
            .collect()
    }
}

/// Progress block of a status response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressWire {
    /// `queued`, `running`, `completed`, `failed` or `unknown`.
    #[serde(default)]
    pub status: Option<String>,
    /// Completion percentage.
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /tasks/status/{task_id}`.
///
/// The top-level `status` stays `pending` while a job executes; the
/// running state is only visible in `progress.status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub progress: Option<ProgressWire>,
    #[serde(default)]
    pub result: Option<EmailDraft>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusResponse {
    /// Derive the job phase from the top-level and progress statuses.
    pub fn phase(&self) -> JobPhase {
        match self.status.as_str() {
            "completed" => JobPhase::Completed,
            "failed" => JobPhase::Failed,
            _ => match self.progress.as_ref().and_then(|p| p.status.as_deref()) {
                Some("running") => JobPhase::Running,
                _ => JobPhase::Pending,
            },
        }
    }

    pub fn into_status(self) -> JobStatus {
        let phase = self.phase();
        let progress = self.progress.map(|p| {
            ProgressRecord::new(p.progress.unwrap_or(0.0), p.message.unwrap_or_default())
        });
        JobStatus {
            phase,
            progress,
            result: self.result,
            error: self.error,
        }
    }
}

/// Response of `POST /tasks/save-email`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveEmailResponse {
    pub id: i64,
    #[serde(default)]
    pub message: String,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}
