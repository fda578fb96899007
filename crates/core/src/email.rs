//! Generated email payload and the commit (save) request built from it.
//!
//! An [`EmailDraft`] is the result a completed generation job reports.
//! Committing a draft sends a [`SaveEmailRequest`] to the save endpoint.

use serde::{Deserialize, Serialize};

use crate::types::CompanyId;

/// Fallback used when the generator could not determine the target's name.
pub const UNKNOWN_COMPANY: &str = "Unknown Company";

/// Contact details scraped from the target's website, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub found: bool,
    pub name: Option<String>,
    pub position: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The result payload of one generation job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub target_company_name: Option<String>,
    #[serde(default)]
    pub target_url: String,
    pub contact_info: Option<ContactInfo>,
}

impl EmailDraft {
    /// A draft without a body has not really been produced yet and is
    /// fetched again on the next result poll.
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Display name of the target company, falling back to
    /// [`UNKNOWN_COMPANY`].
    pub fn company_name(&self) -> &str {
        self.target_company_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_COMPANY)
    }

    /// Whether the generator found any contact details for the target.
    pub fn has_contact(&self) -> bool {
        self.contact_info.as_ref().is_some_and(|c| c.found)
    }
}

/// Body of the save-email (commit) endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveEmailRequest {
    pub company_id: CompanyId,
    pub target_company_name: String,
    pub target_url: String,
    pub subject: String,
    pub body: String,
    pub contact_info: Option<ContactInfo>,
}

impl SaveEmailRequest {
    /// Build the save request for `draft` on behalf of `company_id`.
    pub fn from_draft(company_id: CompanyId, draft: &EmailDraft) -> Self {
        Self {
            company_id,
            target_company_name: draft.company_name().to_string(),
            target_url: draft.target_url.clone(),
            subject: draft.subject.clone(),
            body: draft.body.clone(),
            contact_info: draft.contact_info.clone(),
        }
    }
}
