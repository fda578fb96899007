//! HTTP client for the outreach generation backend.
//!
//! Wraps the three endpoints the monitor depends on (batch submission,
//! job status, save email) using [`reqwest`], and maps their wire
//! formats onto the `outreach-core` job model.

pub mod api;
pub mod credentials;
pub mod wire;

pub use api::{ApiError, GenerationApi};
pub use credentials::Credentials;
