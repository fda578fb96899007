//! Environment configuration for the monitor binary.

use std::str::FromStr;
use std::time::Duration;

use outreach_core::request::{GenerationRequest, PersonalizationLevel, Tone};
use outreach_core::types::CompanyId;

use crate::policy::PollPolicy;
use crate::tracker::{TrackerOptions, DEFAULT_RESULT_INTERVAL};

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Who polls the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollMode {
    /// Only the progress monitor polls; the aggregator consumes its rounds.
    #[default]
    Shared,
    /// The aggregator additionally polls on its own fixed interval.
    Dual,
}

impl FromStr for PollMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "dual" => Ok(Self::Dual),
            other => Err(format!("expected 'shared' or 'dual', got '{other}'")),
        }
    }
}

impl std::fmt::Display for PollMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::Dual => "dual",
        })
    }
}

/// Connection and polling settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Base URL including the API prefix.
    pub api_url: String,
    /// Bearer token sent with every request, if set.
    pub api_token: Option<String>,
    pub poll_mode: PollMode,
    /// Period of the aggregator's own fetch loop (dual mode, and shared-mode
    /// re-fetches after the batch is done).
    pub result_poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl MonitorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                     |
    /// |---------------------------|-----------------------------|
    /// | `OUTREACH_API_URL`        | `http://localhost:8000/api` |
    /// | `OUTREACH_API_TOKEN`      | none                        |
    /// | `POLL_MODE`               | `shared`                    |
    /// | `RESULT_POLL_INTERVAL_MS` | `8000`                      |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable
    /// source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = non_blank(&lookup, "OUTREACH_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_token = non_blank(&lookup, "OUTREACH_API_TOKEN");
        let poll_mode = parse_or(&lookup, "POLL_MODE", PollMode::default())?;

        let result_poll_interval = Duration::from_millis(parse_or(
            &lookup,
            "RESULT_POLL_INTERVAL_MS",
            DEFAULT_RESULT_INTERVAL.as_millis() as u64,
        )?);
        if result_poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "RESULT_POLL_INTERVAL_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        Ok(Self {
            api_url,
            api_token,
            poll_mode,
            result_poll_interval,
            request_timeout,
        })
    }

    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            mode: self.poll_mode,
            policy: PollPolicy::default(),
            result_interval: self.result_poll_interval,
        }
    }
}

/// The batch the binary submits.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub request: GenerationRequest,
    /// Commit every result as soon as it is ready.
    pub auto_commit: bool,
}

impl BatchConfig {
    /// | Env Var                 | Default        |
    /// |-------------------------|----------------|
    /// | `COMPANY_ID`            | required       |
    /// | `TARGET_URLS`           | required       |
    /// | `TONE`                  | `professional` |
    /// | `PERSONALIZATION_LEVEL` | `medium`       |
    /// | `FIND_CONTACT`          | `false`        |
    /// | `CUSTOM_INSTRUCTIONS`   | none           |
    /// | `AUTO_COMMIT`           | `false`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let company_id: CompanyId = parse_required(&lookup, "COMPANY_ID")?;
        let target_urls =
            non_blank(&lookup, "TARGET_URLS").ok_or(ConfigError::Missing("TARGET_URLS"))?;

        let mut request = GenerationRequest::new(company_id, target_urls);
        request.tone = parse_or(&lookup, "TONE", Tone::default())?;
        request.personalization_level =
            parse_or(&lookup, "PERSONALIZATION_LEVEL", PersonalizationLevel::default())?;
        request.find_contact = parse_flag(&lookup, "FIND_CONTACT")?;
        request.custom_instructions = non_blank(&lookup, "CUSTOM_INSTRUCTIONS");

        Ok(Self {
            request,
            auto_commit: parse_flag(&lookup, "AUTO_COMMIT")?,
        })
    }
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_blank(lookup, var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_required<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = non_blank(lookup, var).ok_or(ConfigError::Missing(var))?;
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<bool, ConfigError> {
    match non_blank(lookup, var).map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: v,
                reason: "expected true or false".into(),
            }),
        },
    }
}
