//! The acting identity behind a state change.

use std::fmt;

/// Who performed an operation. Captured once, at the time of the change.
///
/// Audit records store only the textual form of a principal (via `Display`).
/// A stored principal is never resolved back into a live identity — the user
/// may be renamed or deleted long after the record was written, and the
/// record has to stay self-describing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// An authenticated user, identified by username.
    User { username: String },
    /// The backend itself (schedulers, migrations, cleanup jobs).
    System,
}

impl Principal {
    pub fn user(username: impl Into<String>) -> Self {
        Principal::User {
            username: username.into(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User { username } => write!(f, "{username}"),
            Principal::System => write!(f, "system"),
        }
    }
}
