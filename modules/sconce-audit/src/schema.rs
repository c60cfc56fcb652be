//! Audit event table schema.

use sqlx::PgPool;
use tracing::info;

use crate::error::AuditError;

/// SQL to create the audit events table. Idempotent.
pub const CREATE_AUDIT_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS audit_events (
    id              BIGSERIAL    PRIMARY KEY,
    ts              TIMESTAMPTZ  NOT NULL,
    kind            TEXT         NOT NULL,
    category        TEXT         NOT NULL,
    principal       TEXT         NOT NULL,
    entity_id       TEXT         NOT NULL,
    old_state       JSONB,
    new_state       JSONB,
    status          TEXT         NOT NULL DEFAULT 'pending',
    retry_count     INTEGER      NOT NULL DEFAULT 0,
    last_attempt_at TIMESTAMPTZ,
    failure_reason  TEXT,
    claimed_until   TIMESTAMPTZ,
    next_attempt_at TIMESTAMPTZ,
    CHECK (old_state IS NOT NULL OR new_state IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_audit_events_pending
    ON audit_events (id) WHERE status = 'pending';

CREATE INDEX IF NOT EXISTS idx_audit_events_entity
    ON audit_events (category, entity_id, id);
";

/// Apply the schema. Safe to run at every startup.
pub async fn migrate(pool: &PgPool) -> Result<(), AuditError> {
    sqlx::raw_sql(CREATE_AUDIT_EVENTS_TABLE).execute(pool).await?;
    info!("Audit schema applied");
    Ok(())
}
