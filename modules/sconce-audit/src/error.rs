use thiserror::Error;

/// Errors from the audit subsystem.
///
/// Construction and append errors are fatal to the triggering domain
/// operation — the caller must roll back its unit of work so no domain
/// change lands without its audit record.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Malformed record construction: missing snapshots or a blank actor.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A snapshot could not be serialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store could not persist or read records.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// A stored row no longer decodes into a record (unknown kind/category).
    #[error("corrupt event row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}
