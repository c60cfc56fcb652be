//! Core types for the audit event store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Enums ---

/// What happened to the entity. Closed set — a record's kind is part of its
/// identity and new kinds are added here, never as free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Modified => write!(f, "modified"),
            EventKind::Deleted => write!(f, "deleted"),
        }
    }
}

impl EventKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "modified" => Some(Self::Modified),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// The kind of domain entity a record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Consumer,
    Owner,
    Pool,
    Subscription,
    Entitlement,
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityCategory::Consumer => write!(f, "consumer"),
            EntityCategory::Owner => write!(f, "owner"),
            EntityCategory::Pool => write!(f, "pool"),
            EntityCategory::Subscription => write!(f, "subscription"),
            EntityCategory::Entitlement => write!(f, "entitlement"),
        }
    }
}

impl EntityCategory {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "consumer" => Some(Self::Consumer),
            "owner" => Some(Self::Owner),
            "pool" => Some(Self::Pool),
            "subscription" => Some(Self::Subscription),
            "entitlement" => Some(Self::Entitlement),
            _ => None,
        }
    }
}

/// Where a record sits in the delivery lifecycle.
///
/// `Pending` records are picked up by the dispatcher. `Delivered` is terminal
/// success. `Failed` is terminal only after retries are exhausted — until
/// then a failed attempt returns the record to `Pending` with a backoff gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl DeliveryStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// --- Records ---

/// An audit record to be appended. The factory builds this; the store
/// assigns the id. Immutable once persisted.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub kind: EventKind,
    pub category: EntityCategory,
    /// Textual snapshot of the actor. Never blank, never re-resolved.
    pub principal: String,
    pub entity_id: String,
    /// Entity snapshot before the change. Absent for creations.
    pub old_state: Option<serde_json::Value>,
    /// Entity snapshot after the change. Absent for deletions.
    pub new_state: Option<serde_json::Value>,
    /// When the record was built — the audit-trail time of the change.
    pub ts: DateTime<Utc>,
}

impl NewEvent {
    /// Check the record invariants: an attributable actor and the snapshots
    /// its kind requires. Creations carry only `new_state`, deletions only
    /// `old_state`, modifications both.
    pub fn validate(&self) -> Result<(), crate::error::AuditError> {
        use crate::error::AuditError;

        if self.principal.trim().is_empty() {
            return Err(AuditError::InvalidEvent(
                "principal must not be blank".to_string(),
            ));
        }
        if self.old_state.is_none() && self.new_state.is_none() {
            return Err(AuditError::InvalidEvent(
                "at least one of old_state/new_state is required".to_string(),
            ));
        }
        match self.kind {
            EventKind::Created if self.new_state.is_none() => Err(AuditError::InvalidEvent(
                "creation events require new_state".to_string(),
            )),
            EventKind::Created if self.old_state.is_some() => Err(AuditError::InvalidEvent(
                "creation events must not carry old_state".to_string(),
            )),
            EventKind::Deleted if self.old_state.is_none() => Err(AuditError::InvalidEvent(
                "deletion events require old_state".to_string(),
            )),
            EventKind::Deleted if self.new_state.is_some() => Err(AuditError::InvalidEvent(
                "deletion events must not carry new_state".to_string(),
            )),
            EventKind::Modified if self.old_state.is_none() || self.new_state.is_none() => {
                Err(AuditError::InvalidEvent(
                    "modification events require both old_state and new_state".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// An audit record as stored in Postgres. Returned by all read methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    pub kind: EventKind,
    pub category: EntityCategory,
    pub principal: String,
    pub entity_id: String,
    pub old_state: Option<serde_json::Value>,
    pub new_state: Option<serde_json::Value>,
    pub ts: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub retry_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

// --- Retry policy ---

/// Bounded retry with exponential backoff.
///
/// A record gets `max_attempts` delivery tries in total. After the n-th
/// failure the record is gated for `base_backoff * 2^(n-1)`, capped at
/// `max_backoff`. Once attempts are exhausted the record is terminally
/// `Failed` and surfaced via `find_undeliverable`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Backoff gate after `failed_attempts` completed failures (1-based).
    pub fn backoff_after(&self, failed_attempts: i32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(20) as u32;
        let raw = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(exp));
        raw.min(self.max_backoff)
    }

    /// True once `failed_attempts` has used up the whole budget.
    pub fn exhausted(&self, failed_attempts: i32) -> bool {
        failed_attempts >= self.max_attempts
    }
}
