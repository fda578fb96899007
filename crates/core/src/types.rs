/// Server-assigned identifier of a background generation job.
pub type JobId = String;

/// Database key of the sender company a batch is generated for.
pub type CompanyId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
