/// User identities are opaque strings issued by the auth provider.
pub type UserId = String;

/// Job ids are the application's integer job-posting ids.
pub type JobId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
