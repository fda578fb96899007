//! `outreach-monitor` library crate.
//!
//! Tracks a batch of background generation jobs to completion:
//! [`monitor::ProgressMonitor`] polls job statuses with adaptive cadence
//! and backoff, [`aggregator::ResultAggregator`] collects finished email
//! drafts and commits each one at most once, and
//! [`tracker::BatchTracker`] wires both onto a single shared poll.
//! The binary entrypoint lives in `main.rs`.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod policy;
pub mod service;
pub mod tracker;
