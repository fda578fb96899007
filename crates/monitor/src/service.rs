//! Seams to the external collaborators the monitor depends on.
//!
//! The monitor only needs three capabilities: start a batch, query one
//! job's status, and durably save a finished result. They are traits so
//! the polling logic can be driven by scripted fakes in tests; the
//! production implementations delegate to [`GenerationApi`].

use std::sync::Arc;

use async_trait::async_trait;
use outreach_client::GenerationApi;
use outreach_core::email::{EmailDraft, SaveEmailRequest};
use outreach_core::job::{JobHandle, JobStatus};
use outreach_core::request::GenerationRequest;
use outreach_core::types::CompanyId;

use crate::error::ServiceError;

/// Starts a batch of generation jobs.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> Result<Vec<JobHandle>, ServiceError>;
}

/// Reports a job's current phase, progress and result.
///
/// Must be safe to call repeatedly for the same handle.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError>;
}

/// Durably stores a finished result.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn commit_result(
        &self,
        handle: &JobHandle,
        payload: &EmailDraft,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
impl BatchSubmitter for GenerationApi {
    async fn submit(&self, request: &GenerationRequest) -> Result<Vec<JobHandle>, ServiceError> {
        Ok(self.submit_batch(request).await?)
    }
}

#[async_trait]
impl StatusSource for GenerationApi {
    async fn fetch_status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError> {
        Ok(self.get_status(&handle.job_id).await?)
    }
}

/// Saves drafts through the backend's save-email endpoint on behalf of
/// one sender company.
pub struct CompanyOutbox {
    api: Arc<GenerationApi>,
    company_id: CompanyId,
}

impl CompanyOutbox {
    pub fn new(api: Arc<GenerationApi>, company_id: CompanyId) -> Self {
        Self { api, company_id }
    }
}

#[async_trait]
impl ResultSink for CompanyOutbox {
    async fn commit_result(
        &self,
        handle: &JobHandle,
        payload: &EmailDraft,
    ) -> Result<(), ServiceError> {
        let request = SaveEmailRequest::from_draft(self.company_id, payload);
        let saved = self.api.save_email(&request).await?;
        tracing::info!(
            job_id = %handle.job_id,
            company_id = self.company_id,
            email_id = saved.id,
            "Generated email saved",
        );
        Ok(())
    }
}
