//! The outbound delivery contract.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use sconce_audit::StoredEvent;

/// An external consumer of audit records.
///
/// Listeners are registered once at process start and invoked in a fixed
/// registration order — a listener may rely on having seen the earlier
/// records for an entity before the later ones. `deliver` returning an error
/// (or timing out) fails the whole record, which the dispatcher will retry.
#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &StoredEvent) -> Result<()>;
}

/// Logs every delivered record. Never fails — useful as a delivery smoke
/// test and as the default target when no webhooks are configured.
pub struct LogListener;

#[async_trait]
impl EventListener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &StoredEvent) -> Result<()> {
        info!(
            id = event.id,
            kind = %event.kind,
            category = %event.category,
            entity_id = event.entity_id.as_str(),
            principal = event.principal.as_str(),
            "Audit event"
        );
        Ok(())
    }
}
