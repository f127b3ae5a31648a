/// Stable external identifier of an uploaded image asset.
pub type PublicId = String;

/// Opaque handle returned by the media service for an asynchronous job.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
