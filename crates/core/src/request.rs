//! Batch generation request and its validation.
//!
//! A request names one sender company and a comma-separated list of
//! target websites; the submission endpoint starts one generation job per
//! target URL.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::CompanyId;

/// Loose "looks like a web address" check applied to every target URL.
const TARGET_URL_PATTERN: &str = r"^(https?://)?([\da-z.-]+)\.([a-z.]{2,6})([/\w .-]*)*/?$";

static TARGET_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TARGET_URL_PATTERN).expect("valid regex"));

/// Writing tone requested for the generated emails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Formal,
    Direct,
}

impl FromStr for Tone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(Self::Professional),
            "casual" => Ok(Self::Casual),
            "formal" => Ok(Self::Formal),
            "direct" => Ok(Self::Direct),
            other => Err(CoreError::Validation(format!(
                "Unknown tone: '{other}'. Valid tones: professional, casual, formal, direct"
            ))),
        }
    }
}

/// How deeply the generator researches each target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonalizationLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for PersonalizationLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(CoreError::Validation(format!(
                "Unknown personalization level: '{other}'. Valid levels: low, medium, high"
            ))),
        }
    }
}

/// Body of the batch submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub company_id: CompanyId,
    /// Comma-separated list of target websites.
    pub target_urls: String,
    #[serde(default)]
    pub find_contact: bool,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub personalization_level: PersonalizationLevel,
    pub custom_instructions: Option<String>,
}

impl GenerationRequest {
    pub fn new(company_id: CompanyId, target_urls: impl Into<String>) -> Self {
        Self {
            company_id,
            target_urls: target_urls.into(),
            find_contact: false,
            tone: Tone::default(),
            personalization_level: PersonalizationLevel::default(),
            custom_instructions: None,
        }
    }

    /// Trimmed, non-blank target URLs in submission order.
    pub fn targets(&self) -> Vec<String> {
        parse_target_urls(&self.target_urls)
    }

    /// Check the request before submission and return its targets.
    pub fn validate(&self) -> Result<Vec<String>, CoreError> {
        let targets = self.targets();
        if targets.is_empty() {
            return Err(CoreError::Validation("No target URLs provided".to_string()));
        }
        for url in &targets {
            validate_target_url(url)?;
        }
        Ok(targets)
    }
}

/// Split a comma-separated URL list, trimming entries and dropping blanks.
pub fn parse_target_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate that a single target looks like a web address.
pub fn validate_target_url(url: &str) -> Result<(), CoreError> {
    if TARGET_URL_RE.is_match(url) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("Invalid URL format: {url}")))
    }
}
