//! Durable audit trail for the Sconce entitlement backend.
//!
//! Every state change to a domain entity (consumer, owner, pool, ...) is
//! recorded as an immutable event row in the same transaction as the change
//! itself. The rows double as a delivery queue: a background dispatcher
//! drains pending records and forwards them to external listeners.
//!
//! Records are append-only and never deleted — retention is someone else's
//! policy, not this crate's.

pub mod error;
pub mod factory;
pub mod pg;
pub mod recorder;
pub mod schema;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mem;

pub use error::AuditError;
pub use factory::EventFactory;
pub use pg::PgEventStore;
pub use recorder::AuditRecorder;
pub use schema::migrate;
pub use store::EventStore;
pub use types::{
    DeliveryStatus, EntityCategory, EventKind, NewEvent, RetryPolicy, StoredEvent,
};

#[cfg(any(test, feature = "test-utils"))]
pub use mem::MemEventStore;
