//! The inbound surface for domain operations.
//!
//! Domain code calls one of these inside its own transaction. A failure here
//! must fail the whole operation — the domain change and its audit record
//! commit or roll back together.

use serde::Serialize;

use sconce_common::Principal;

use crate::error::AuditError;
use crate::factory::EventFactory;
use crate::pg::PgEventStore;
use crate::types::{EntityCategory, StoredEvent};

/// Builds and appends audit records for domain state changes.
#[derive(Clone)]
pub struct AuditRecorder {
    store: PgEventStore,
}

impl AuditRecorder {
    pub fn new(store: PgEventStore) -> Self {
        Self { store }
    }

    /// Record an entity creation inside the caller's transaction.
    pub async fn record_created<'e, E, N>(
        &self,
        executor: E,
        principal: &Principal,
        category: EntityCategory,
        entity_id: &str,
        new_state: &N,
    ) -> Result<StoredEvent, AuditError>
    where
        E: sqlx::PgExecutor<'e>,
        N: Serialize,
    {
        let event = EventFactory::created(principal, category, entity_id, new_state)?;
        self.store.append_with(executor, event).await
    }

    /// Record an entity modification inside the caller's transaction.
    pub async fn record_modified<'e, E, O, N>(
        &self,
        executor: E,
        principal: &Principal,
        category: EntityCategory,
        entity_id: &str,
        old_state: &O,
        new_state: &N,
    ) -> Result<StoredEvent, AuditError>
    where
        E: sqlx::PgExecutor<'e>,
        O: Serialize,
        N: Serialize,
    {
        let event = EventFactory::modified(principal, category, entity_id, old_state, new_state)?;
        self.store.append_with(executor, event).await
    }

    /// Record an entity deletion inside the caller's transaction.
    pub async fn record_deleted<'e, E, O>(
        &self,
        executor: E,
        principal: &Principal,
        category: EntityCategory,
        entity_id: &str,
        old_state: &O,
    ) -> Result<StoredEvent, AuditError>
    where
        E: sqlx::PgExecutor<'e>,
        O: Serialize,
    {
        let event = EventFactory::deleted(principal, category, entity_id, old_state)?;
        self.store.append_with(executor, event).await
    }
}
