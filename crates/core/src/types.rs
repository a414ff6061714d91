/// Job identifiers are opaque strings assigned by the remote job store.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
