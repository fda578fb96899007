//! Error types surfaced by the monitor crate.

use outreach_client::ApiError;
use outreach_core::error::CoreError;
use outreach_core::types::JobId;

/// Failure of one call to an external collaborator (status query,
/// commit or submission), independent of the transport behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// The call never produced a response (network, timeout, decoding).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The collaborator answered with an error.
    #[error("Rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Request(e) => Self::Transport(e.to_string()),
            ApiError::Api { status, detail } => Self::Rejected { status, detail },
        }
    }
}

/// Returned by `commit()` when the save endpoint did not accept a result.
///
/// The entry stays uncommitted so a later call may retry.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("Failed to commit result for job {job_id}: {source}")]
    Rejected {
        job_id: JobId,
        #[source]
        source: ServiceError,
    },
}

/// Errors from starting a tracked batch.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The generation request failed validation before submission.
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),

    /// The submission endpoint call failed.
    #[error("Failed to submit batch: {0}")]
    SubmitFailed(#[from] ServiceError),

    /// The backend accepted the request but started no jobs.
    #[error("Submission returned no jobs")]
    EmptyBatch,
}
