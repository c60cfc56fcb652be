//! In-memory `EventStore` for testing. No database required.
//!
//! Mirrors the Postgres semantics — leases, backoff gates, bounded retries —
//! against a mutex-guarded vec, so dispatcher behavior can be exercised in
//! plain unit tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AuditError;
use crate::store::EventStore;
use crate::types::{DeliveryStatus, EntityCategory, NewEvent, RetryPolicy, StoredEvent};

struct MemRecord {
    stored: StoredEvent,
    claimed_until: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
}

/// Thread-safe in-memory store with incrementing ids.
pub struct MemEventStore {
    next_id: AtomicI64,
    records: Mutex<Vec<MemRecord>>,
    lease: Duration,
}

impl MemEventStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            records: Mutex::new(Vec::new()),
            lease: Duration::from_secs(60),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Snapshot of every record, for test assertions.
    pub fn all(&self) -> Vec<StoredEvent> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.stored.clone())
            .collect()
    }
}

impl Default for MemEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemEventStore {
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, AuditError> {
        event.validate()?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = StoredEvent {
            id,
            kind: event.kind,
            category: event.category,
            principal: event.principal,
            entity_id: event.entity_id,
            old_state: event.old_state,
            new_state: event.new_state,
            ts: event.ts,
            status: DeliveryStatus::Pending,
            retry_count: 0,
            last_attempt_at: None,
            failure_reason: None,
        };
        self.records.lock().unwrap().push(MemRecord {
            stored: stored.clone(),
            claimed_until: None,
            next_attempt_at: None,
        });
        Ok(stored)
    }

    async fn fetch_pending(
        &self,
        category: Option<EntityCategory>,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, AuditError> {
        let now = Utc::now();
        let lease_until = now + chrono::Duration::from_std(self.lease).unwrap();

        let mut records = self.records.lock().unwrap();
        let mut claimed = Vec::new();
        for record in records.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if record.stored.status != DeliveryStatus::Pending {
                continue;
            }
            if record.claimed_until.is_some_and(|until| until > now) {
                continue;
            }
            if record.next_attempt_at.is_some_and(|at| at > now) {
                continue;
            }
            if category.is_some_and(|c| c != record.stored.category) {
                continue;
            }
            record.claimed_until = Some(lease_until);
            claimed.push(record.stored.clone());
        }
        // Records are stored in append order, so claimed is already id-ascending.
        Ok(claimed)
    }

    async fn mark_delivered(&self, id: i64) -> Result<(), AuditError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.stored.id == id) {
            if record.stored.status != DeliveryStatus::Delivered {
                record.stored.status = DeliveryStatus::Delivered;
                record.stored.last_attempt_at = Some(Utc::now());
                record.stored.failure_reason = None;
                record.claimed_until = None;
            }
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        reason: &str,
        policy: &RetryPolicy,
    ) -> Result<DeliveryStatus, AuditError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.stored.id == id)
            .ok_or(AuditError::Persistence(sqlx::Error::RowNotFound))?;

        if record.stored.status != DeliveryStatus::Pending {
            return Ok(record.stored.status);
        }

        record.stored.retry_count += 1;
        record.stored.last_attempt_at = Some(Utc::now());
        record.stored.failure_reason = Some(reason.to_string());
        record.claimed_until = None;

        let backoff = policy.backoff_after(record.stored.retry_count);
        record.next_attempt_at = Some(Utc::now() + chrono::Duration::from_std(backoff).unwrap());

        if policy.exhausted(record.stored.retry_count) {
            record.stored.status = DeliveryStatus::Failed;
        }
        Ok(record.stored.status)
    }

    async fn find_by_entity(
        &self,
        category: EntityCategory,
        entity_id: &str,
    ) -> Result<Vec<StoredEvent>, AuditError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stored.category == category && r.stored.entity_id == entity_id)
            .map(|r| r.stored.clone())
            .collect())
    }

    async fn find_undeliverable(&self, limit: i64) -> Result<Vec<StoredEvent>, AuditError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stored.status == DeliveryStatus::Failed)
            .take(limit as usize)
            .map(|r| r.stored.clone())
            .collect())
    }
}
