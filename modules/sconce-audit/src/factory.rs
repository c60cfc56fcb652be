//! Builds well-formed audit records from domain operation outcomes.

use chrono::Utc;
use serde::Serialize;

use sconce_common::Principal;

use crate::error::AuditError;
use crate::types::{EntityCategory, EventKind, NewEvent};

/// Stateless constructors for audit records.
///
/// Snapshots are serialized here, inside the triggering operation, so a
/// snapshot that cannot be represented fails the operation rather than
/// producing a hole in the audit trail. The principal is flattened to its
/// textual form — the record never holds a live identity.
pub struct EventFactory;

impl EventFactory {
    /// Record the creation of an entity.
    pub fn created<N: Serialize>(
        principal: &Principal,
        category: EntityCategory,
        entity_id: impl Into<String>,
        new_state: &N,
    ) -> Result<NewEvent, AuditError> {
        Self::build(
            EventKind::Created,
            principal,
            category,
            entity_id.into(),
            None,
            Some(serde_json::to_value(new_state)?),
        )
    }

    /// Record a modification, with before and after snapshots.
    pub fn modified<O: Serialize, N: Serialize>(
        principal: &Principal,
        category: EntityCategory,
        entity_id: impl Into<String>,
        old_state: &O,
        new_state: &N,
    ) -> Result<NewEvent, AuditError> {
        Self::build(
            EventKind::Modified,
            principal,
            category,
            entity_id.into(),
            Some(serde_json::to_value(old_state)?),
            Some(serde_json::to_value(new_state)?),
        )
    }

    /// Record the deletion of an entity.
    pub fn deleted<O: Serialize>(
        principal: &Principal,
        category: EntityCategory,
        entity_id: impl Into<String>,
        old_state: &O,
    ) -> Result<NewEvent, AuditError> {
        Self::build(
            EventKind::Deleted,
            principal,
            category,
            entity_id.into(),
            Some(serde_json::to_value(old_state)?),
            None,
        )
    }

    fn build(
        kind: EventKind,
        principal: &Principal,
        category: EntityCategory,
        entity_id: String,
        old_state: Option<serde_json::Value>,
        new_state: Option<serde_json::Value>,
    ) -> Result<NewEvent, AuditError> {
        let event = NewEvent {
            kind,
            category,
            principal: principal.to_string(),
            entity_id,
            old_state,
            new_state,
            ts: Utc::now(),
        };
        event.validate()?;
        Ok(event)
    }
}
