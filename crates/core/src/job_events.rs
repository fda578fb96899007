//! Event type names for monitor lifecycle events.
//!
//! Used by `outreach-monitor` when broadcasting job and batch updates so
//! that serialized events carry a stable `type` discriminator.

/// Progress update for a single job (percentage + message).
pub const EVENT_JOB_PROGRESS: &str = "job_progress";

/// Job reached the `completed` phase.
pub const EVENT_JOB_COMPLETED: &str = "job_completed";

/// Job reached the `failed` phase.
pub const EVENT_JOB_FAILED: &str = "job_failed";

/// A completed job's payload became available as a result entry.
pub const EVENT_RESULT_READY: &str = "result_ready";

/// A result entry was committed to the save endpoint.
pub const EVENT_RESULT_COMMITTED: &str = "result_committed";

/// A polling round hit a transient status-query error.
pub const EVENT_POLL_ERROR: &str = "poll_error";

/// The next polling round was scheduled.
pub const EVENT_ROUND_SCHEDULED: &str = "round_scheduled";

/// Every job in the batch reached a terminal phase.
pub const EVENT_BATCH_DONE: &str = "batch_done";
