//! REST API client for the generation backend.
//!
//! Wraps batch submission, job status retrieval and result saving using
//! [`reqwest`]. Every request carries the caller-supplied
//! [`Credentials`].

use std::time::Duration;

use outreach_core::email::SaveEmailRequest;
use outreach_core::job::{JobHandle, JobStatus};
use outreach_core::request::GenerationRequest;

use crate::credentials::Credentials;
use crate::wire::{ErrorBody, SaveEmailResponse, StatusResponse, SubmitResponse};

/// Detail used when an error response has no usable JSON body.
const UNREADABLE_ERROR_DETAIL: &str = "An error occurred while fetching the data.";

/// Detail used when the JSON error body has no `detail` string.
const GENERIC_ERROR_DETAIL: &str = "An error occurred";

/// HTTP client for one generation backend.
pub struct GenerationApi {
    client: reqwest::Client,
    api_url: String,
    credentials: Credentials,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, bad body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {detail}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The backend's `detail` message.
        detail: String,
    },
}

impl GenerationApi {
    /// Create a new client.
    ///
    /// * `api_url` - Base URL including the API prefix, e.g.
    ///   `http://localhost:8000/api`.
    pub fn new(api_url: impl Into<String>, credentials: Credentials) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, credentials)
    }

    /// Create a client whose requests time out after `timeout`.
    pub fn with_timeout(
        api_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url, credentials))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            credentials,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Start one generation job per target URL.
    ///
    /// Sends `POST /tasks/generate-emails` and returns the job handles in
    /// the order the backend created them.
    pub async fn submit_batch(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<JobHandle>, ApiError> {
        let response = self
            .credentials
            .apply(self.client.post(self.url("/tasks/generate-emails")))
            .json(request)
            .send()
            .await?;

        let body: SubmitResponse = Self::parse_response(response).await?;
        let handles = body.into_handles();
        tracing::info!(
            company_id = request.company_id,
            job_count = handles.len(),
            "Generation batch submitted",
        );
        Ok(handles)
    }

    /// Fetch the current status of one job.
    ///
    /// Sends `GET /tasks/status/{job_id}`.
    pub async fn get_status(&self, job_id: &str) -> Result<JobStatus, ApiError> {
        let response = self
            .credentials
            .apply(self.client.get(self.url(&format!("/tasks/status/{job_id}"))))
            .send()
            .await?;

        let body: StatusResponse = Self::parse_response(response).await?;
        Ok(body.into_status())
    }

    /// Persist a generated email.
    ///
    /// Sends `POST /tasks/save-email`.
    pub async fn save_email(
        &self,
        request: &SaveEmailRequest,
    ) -> Result<SaveEmailResponse, ApiError> {
        let response = self
            .credentials
            .apply(self.client.post(self.url("/tasks/save-email")))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Ensure the response has a success status code, otherwise turn the
    /// backend's `{"detail": ...}` body into an [`ApiError::Api`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(ApiError::Api {
            status: status.as_u16(),
            detail: error_detail(&text),
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Extract the human-readable message from an error response body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
        }) if !detail.is_empty() => detail,
        Ok(_) => GENERIC_ERROR_DETAIL.to_string(),
        Err(_) => UNREADABLE_ERROR_DETAIL.to_string(),
    }
}
