//! The store contract the rest of the system depends on.
//!
//! Implemented by `PgEventStore` (postgres) and `MemEventStore` (tests,
//! behind the `test-utils` feature). The dispatcher and audit queries only
//! ever see this trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuditError;
use crate::types::{DeliveryStatus, EntityCategory, NewEvent, RetryPolicy, StoredEvent};

/// Append-only, durably ordered collection of audit records.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably persist a record and assign its id. Ids are monotonic and
    /// never reused; ordering by id matches creation order.
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, AuditError>;

    /// Claim up to `limit` pending records whose lease is free and whose
    /// retry backoff has elapsed, ascending by id. A claimed record stays
    /// `Pending` until a delivery outcome is recorded, so a crashed worker
    /// only delays it, never loses it.
    async fn fetch_pending(
        &self,
        category: Option<EntityCategory>,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, AuditError>;

    /// Record terminal delivery success. Idempotent.
    async fn mark_delivered(&self, id: i64) -> Result<(), AuditError>;

    /// Record a failed delivery attempt: bump the retry count, store the
    /// reason, release the lease, and gate the next attempt per `policy`.
    /// Returns the resulting status — `Pending` if the record will be
    /// retried, `Failed` once attempts are exhausted. No-op on records
    /// already delivered or already terminal.
    async fn mark_failed(
        &self,
        id: i64,
        reason: &str,
        policy: &RetryPolicy,
    ) -> Result<DeliveryStatus, AuditError>;

    /// Full audit history for one entity, ascending by id.
    async fn find_by_entity(
        &self,
        category: EntityCategory,
        entity_id: &str,
    ) -> Result<Vec<StoredEvent>, AuditError>;

    /// Terminally failed records, ascending by id. Operator surface for
    /// deliveries that exhausted their retries.
    async fn find_undeliverable(&self, limit: i64) -> Result<Vec<StoredEvent>, AuditError>;
}

// Arc blanket — lets the dispatcher and tests share one store instance.
#[async_trait]
impl<S: EventStore + ?Sized> EventStore for Arc<S> {
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, AuditError> {
        (**self).append(event).await
    }

    async fn fetch_pending(
        &self,
        category: Option<EntityCategory>,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, AuditError> {
        (**self).fetch_pending(category, limit).await
    }

    async fn mark_delivered(&self, id: i64) -> Result<(), AuditError> {
        (**self).mark_delivered(id).await
    }

    async fn mark_failed(
        &self,
        id: i64,
        reason: &str,
        policy: &RetryPolicy,
    ) -> Result<DeliveryStatus, AuditError> {
        (**self).mark_failed(id, reason, policy).await
    }

    async fn find_by_entity(
        &self,
        category: EntityCategory,
        entity_id: &str,
    ) -> Result<Vec<StoredEvent>, AuditError> {
        (**self).find_by_entity(category, entity_id).await
    }

    async fn find_undeliverable(&self, limit: i64) -> Result<Vec<StoredEvent>, AuditError> {
        (**self).find_undeliverable(limit).await
    }
}
