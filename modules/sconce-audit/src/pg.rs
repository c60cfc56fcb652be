//! Postgres implementation of the `EventStore` contract.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AuditError;
use crate::store::EventStore;
use crate::types::{DeliveryStatus, EntityCategory, EventKind, NewEvent, RetryPolicy, StoredEvent};

/// Default worker lease on a claimed batch. A worker that dies mid-batch
/// releases its records when the lease expires.
const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// Postgres-backed audit event store. The single source of truth.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    lease: Duration,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Append within the caller's transaction (or any executor).
    ///
    /// This is the atomicity boundary: a domain write and its audit record
    /// go through the same transaction, so neither is ever visible without
    /// the other. `EventStore::append` is the pool-level convenience.
    pub async fn append_with<'e, E>(
        &self,
        executor: E,
        event: NewEvent,
    ) -> Result<StoredEvent, AuditError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        event.validate()?;

        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO audit_events (kind, category, principal, entity_id, old_state, new_state, ts)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, ts, kind, category, principal, entity_id, old_state, new_state,
                      status, retry_count, last_attempt_at, failure_reason
            "#,
        )
        .bind(event.kind.to_string())
        .bind(event.category.to_string())
        .bind(&event.principal)
        .bind(&event.entity_id)
        .bind(&event.old_state)
        .bind(&event.new_state)
        .bind(event.ts)
        .fetch_one(executor)
        .await?;

        row.into_stored()
    }

    /// Read a single record by id.
    pub async fn read_event(&self, id: i64) -> Result<Option<StoredEvent>, AuditError> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, ts, kind, category, principal, entity_id, old_state, new_state,
                   status, retry_count, last_attempt_at, failure_reason
            FROM audit_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EventRow::into_stored).transpose()
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, AuditError> {
        self.append_with(&self.pool, event).await
    }

    async fn fetch_pending(
        &self,
        category: Option<EntityCategory>,
        limit: i64,
    ) -> Result<Vec<StoredEvent>, AuditError> {
        // Claim with SKIP LOCKED plus a lease so two workers never hold the
        // same record, even across a worker crash.
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            WITH claimed AS (
                SELECT id FROM audit_events
                WHERE status = 'pending'
                  AND (claimed_until IS NULL OR claimed_until < now())
                  AND (next_attempt_at IS NULL OR next_attempt_at <= now())
                  AND ($2::text IS NULL OR category = $2)
                ORDER BY id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE audit_events e
            SET claimed_until = now() + make_interval(secs => $3)
            FROM claimed
            WHERE e.id = claimed.id
            RETURNING e.id, e.ts, e.kind, e.category, e.principal, e.entity_id,
                      e.old_state, e.new_state, e.status, e.retry_count,
                      e.last_attempt_at, e.failure_reason
            "#,
        )
        .bind(limit)
        .bind(category.map(|c| c.to_string()))
        .bind(self.lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        // UPDATE ... RETURNING does not guarantee row order.
        let mut events = rows
            .into_iter()
            .map(EventRow::into_stored)
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    async fn mark_delivered(&self, id: i64) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            UPDATE audit_events
            SET status = 'delivered',
                last_attempt_at = now(),
                failure_reason = NULL,
                claimed_until = NULL
            WHERE id = $1 AND status <> 'delivered'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        reason: &str,
        policy: &RetryPolicy,
    ) -> Result<DeliveryStatus, AuditError> {
        // Single atomic update: bump the attempt count, gate the next try
        // with exponential backoff, and go terminal once attempts run out.
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            UPDATE audit_events
            SET retry_count = retry_count + 1,
                last_attempt_at = now(),
                failure_reason = $2,
                claimed_until = NULL,
                next_attempt_at = now()
                    + make_interval(secs => least($3 * power(2::float8, retry_count), $4)),
                status = CASE WHEN retry_count + 1 >= $5 THEN 'failed' ELSE 'pending' END
            WHERE id = $1 AND status = 'pending'
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(policy.base_backoff.as_secs_f64())
        .bind(policy.max_backoff.as_secs_f64())
        .bind(policy.max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        let status = match row {
            Some((status,)) => status,
            // Already delivered or already terminal — report the current
            // status without touching the row.
            None => {
                sqlx::query_as::<_, (String,)>("SELECT status FROM audit_events WHERE id = $1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?
                    .0
            }
        };

        DeliveryStatus::from_str(&status).ok_or_else(|| AuditError::Corrupt {
            id,
            reason: format!("unknown delivery status '{status}'"),
        })
    }

    async fn find_by_entity(
        &self,
        category: EntityCategory,
        entity_id: &str,
    ) -> Result<Vec<StoredEvent>, AuditError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, ts, kind, category, principal, entity_id, old_state, new_state,
                   status, retry_count, last_attempt_at, failure_reason
            FROM audit_events
            WHERE category = $1 AND entity_id = $2
            ORDER BY id ASC
            "#,
        )
        .bind(category.to_string())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_stored).collect()
    }

    async fn find_undeliverable(&self, limit: i64) -> Result<Vec<StoredEvent>, AuditError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, ts, kind, category, principal, entity_id, old_state, new_state,
                   status, retry_count, last_attempt_at, failure_reason
            FROM audit_events
            WHERE status = 'failed'
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_stored).collect()
    }
}

// --- Row mapping ---

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    ts: DateTime<Utc>,
    kind: String,
    category: String,
    principal: String,
    entity_id: String,
    old_state: Option<serde_json::Value>,
    new_state: Option<serde_json::Value>,
    status: String,
    retry_count: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl EventRow {
    fn into_stored(self) -> Result<StoredEvent, AuditError> {
        let corrupt = |field: &str, value: &str| AuditError::Corrupt {
            id: self.id,
            reason: format!("unknown {field} '{value}'"),
        };

        Ok(StoredEvent {
            id: self.id,
            kind: EventKind::from_str(&self.kind).ok_or_else(|| corrupt("kind", &self.kind))?,
            category: EntityCategory::from_str(&self.category)
                .ok_or_else(|| corrupt("category", &self.category))?,
            principal: self.principal,
            entity_id: self.entity_id,
            old_state: self.old_state,
            new_state: self.new_state,
            ts: self.ts,
            status: DeliveryStatus::from_str(&self.status)
                .ok_or_else(|| corrupt("status", &self.status))?,
            retry_count: self.retry_count,
            last_attempt_at: self.last_attempt_at,
            failure_reason: self.failure_reason,
        })
    }
}
