//! Domain model shared by the outreach client and monitor crates.
//!
//! Holds the per-job state machine, aggregate progress computation, the
//! generation request model and the generated email payload. Nothing in
//! this crate performs I/O.

pub mod email;
pub mod error;
pub mod job;
pub mod job_events;
pub mod progress;
pub mod request;
pub mod types;
