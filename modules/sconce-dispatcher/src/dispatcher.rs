//! The background delivery worker.
//!
//! A recurring cycle: claim a batch of pending records, push each through
//! every listener in order, record the outcome. Domain operations never
//! block on this — they only ever append.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use sconce_audit::{AuditError, DeliveryStatus, EntityCategory, EventStore, RetryPolicy, StoredEvent};

use crate::listener::EventListener;

/// Tuning for one dispatcher worker.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Max records claimed per cycle.
    pub batch_size: i64,
    /// Pause between cycles (and the backoff after a store failure).
    pub poll_interval: Duration,
    /// Per-listener invocation bound. A hung listener fails the record
    /// instead of stalling the batch.
    pub listener_timeout: Duration,
    pub retry: RetryPolicy,
    /// Restrict this worker to one entity category. Lets a small pool of
    /// workers partition the queue while keeping per-entity order.
    pub category: Option<EntityCategory>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_secs(5),
            listener_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            category: None,
        }
    }
}

/// Outcome counts for one dispatch cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub fetched: usize,
    pub delivered: usize,
    pub retried: usize,
    pub exhausted: usize,
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} delivered={} retried={} exhausted={}",
            self.fetched, self.delivered, self.retried, self.exhausted
        )
    }
}

enum Outcome {
    Delivered,
    Retrying,
    Exhausted,
}

/// Drains pending audit records to the registered listeners.
pub struct Dispatcher<S: EventStore> {
    store: S,
    listeners: Vec<Box<dyn EventListener>>,
    config: DispatcherConfig,
}

impl<S: EventStore> Dispatcher<S> {
    pub fn new(store: S, config: DispatcherConfig) -> Self {
        Self {
            store,
            listeners: Vec::new(),
            config,
        }
    }

    /// Register a listener. Order of registration is the order of delivery.
    pub fn register(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Run cycles until `shutdown` flips to true. Shutdown is graceful: the
    /// current record finishes its listener pass, no new record or batch is
    /// started. Store failures log and back off — the worker never dies.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            listeners = self.listeners.len(),
            batch_size = self.config.batch_size,
            category = ?self.config.category,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.run_cycle(&shutdown).await {
                Ok(stats) if stats.fetched > 0 => info!(%stats, "Dispatch cycle complete"),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Dispatch cycle failed, backing off");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// One pass: claim a batch and attempt delivery of each record in id
    /// order. Listener failures are isolated per record; only store errors
    /// propagate.
    pub async fn run_cycle(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleStats, AuditError> {
        let batch = self
            .store
            .fetch_pending(self.config.category, self.config.batch_size)
            .await?;

        let mut stats = CycleStats {
            fetched: batch.len(),
            ..CycleStats::default()
        };

        for event in &batch {
            if *shutdown.borrow() {
                // Unprocessed claims fall back to pending when their lease
                // expires.
                break;
            }
            match self.deliver_one(event).await? {
                Outcome::Delivered => stats.delivered += 1,
                Outcome::Retrying => stats.retried += 1,
                Outcome::Exhausted => stats.exhausted += 1,
            }
        }

        Ok(stats)
    }

    /// Push one record through every listener. The record is delivered only
    /// if all listeners succeed; the first failure records the outcome and
    /// stops the pass.
    async fn deliver_one(&self, event: &StoredEvent) -> Result<Outcome, AuditError> {
        for listener in &self.listeners {
            let attempt =
                tokio::time::timeout(self.config.listener_timeout, listener.deliver(event)).await;

            let reason = match attempt {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{}: {e:#}", listener.name()),
                Err(_) => format!(
                    "{}: timed out after {:?}",
                    listener.name(),
                    self.config.listener_timeout
                ),
            };

            warn!(id = event.id, reason = reason.as_str(), "Delivery attempt failed");
            let status = self
                .store
                .mark_failed(event.id, &reason, &self.config.retry)
                .await?;

            return Ok(if status == DeliveryStatus::Failed {
                error!(
                    id = event.id,
                    attempts = self.config.retry.max_attempts,
                    "Audit event is undeliverable, giving up"
                );
                Outcome::Exhausted
            } else {
                Outcome::Retrying
            });
        }

        self.store.mark_delivered(event.id).await?;
        Ok(Outcome::Delivered)
    }
}
