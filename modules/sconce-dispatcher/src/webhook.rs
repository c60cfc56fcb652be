//! HTTP delivery of audit records.

use anyhow::{Context, Result};
use async_trait::async_trait;

use sconce_audit::StoredEvent;

use crate::listener::EventListener;

/// POSTs each record as JSON to a fixed URL. Any non-2xx response or
/// transport error counts as a failed delivery.
pub struct WebhookListener {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookListener {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EventListener for WebhookListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &StoredEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("POST {} rejected", self.url))?;
        Ok(())
    }
}
