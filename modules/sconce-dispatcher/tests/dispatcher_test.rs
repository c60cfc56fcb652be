//! Dispatcher behavior tests against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use sconce_audit::{
    DeliveryStatus, EntityCategory, EventFactory, EventStore, MemEventStore, NewEvent, RetryPolicy,
    StoredEvent,
};
use sconce_common::Principal;
use sconce_dispatcher::{Dispatcher, DispatcherConfig, EventListener};

// =========================================================================
// Test listeners
// =========================================================================

/// Records (listener name, event id) into a shared log.
struct Recording {
    name: &'static str,
    log: Arc<Mutex<Vec<(String, i64)>>>,
}

#[async_trait]
impl EventListener for Recording {
    fn name(&self) -> &str {
        self.name
    }

    async fn deliver(&self, event: &StoredEvent) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.name.to_string(), event.id));
        Ok(())
    }
}

/// Always fails, counting attempts.
struct AlwaysFails {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EventListener for AlwaysFails {
    fn name(&self) -> &str {
        "always-fails"
    }

    async fn deliver(&self, _event: &StoredEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("connection refused"))
    }
}

/// Fails only for one entity id.
struct FailsFor {
    entity_id: &'static str,
}

#[async_trait]
impl EventListener for FailsFor {
    fn name(&self) -> &str {
        "fails-for"
    }

    async fn deliver(&self, event: &StoredEvent) -> Result<()> {
        if event.entity_id == self.entity_id {
            return Err(anyhow!("rejected"));
        }
        Ok(())
    }
}

/// Never returns within any sane timeout.
struct Hangs;

#[async_trait]
impl EventListener for Hangs {
    fn name(&self) -> &str {
        "hangs"
    }

    async fn deliver(&self, _event: &StoredEvent) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn test_config(max_attempts: i32) -> DispatcherConfig {
    DispatcherConfig {
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
        listener_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        },
        category: None,
    }
}

fn owner_created(entity_id: &str) -> NewEvent {
    EventFactory::created(
        &Principal::user("admin"),
        EntityCategory::Owner,
        entity_id,
        &json!({"name": "Foo"}),
    )
    .unwrap()
}

// =========================================================================
// Delivery
// =========================================================================

#[tokio::test]
async fn successful_listener_delivers_on_first_attempt() {
    let store = Arc::new(MemEventStore::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = Dispatcher::new(store.clone(), test_config(5));
    dispatcher.register(Box::new(Recording {
        name: "recording",
        log: log.clone(),
    }));

    store.append(owner_created("42")).await.unwrap();

    let (_tx, shutdown) = watch::channel(false);
    let stats = dispatcher.run_cycle(&shutdown).await.unwrap();
    assert_eq!(stats.fetched, 1);
    assert_eq!(stats.delivered, 1);

    let all = store.all();
    assert_eq!(all[0].status, DeliveryStatus::Delivered);
    assert_eq!(all[0].retry_count, 0);

    // Queue is drained.
    assert!(store.fetch_pending(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn failing_listener_gets_exactly_max_attempts() {
    let store = Arc::new(MemEventStore::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new(store.clone(), test_config(3));
    dispatcher.register(Box::new(AlwaysFails {
        calls: calls.clone(),
    }));

    store.append(owner_created("42")).await.unwrap();

    let (_tx, shutdown) = watch::channel(false);
    for _ in 0..5 {
        dispatcher.run_cycle(&shutdown).await.unwrap();
    }

    // Three attempts, then terminal — later cycles find nothing to do.
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let all = store.all();
    assert_eq!(all[0].status, DeliveryStatus::Failed);
    assert_eq!(all[0].retry_count, 3);
    assert_eq!(all[0].failure_reason.as_deref(), Some("always-fails: connection refused"));

    let undeliverable = store.find_undeliverable(10).await.unwrap();
    assert_eq!(undeliverable.len(), 1);
}

#[tokio::test]
async fn records_are_delivered_in_id_order() {
    let store = Arc::new(MemEventStore::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = Dispatcher::new(store.clone(), test_config(5));
    dispatcher.register(Box::new(Recording {
        name: "recording",
        log: log.clone(),
    }));

    let first = store.append(owner_created("42")).await.unwrap();
    let second = store.append(owner_created("42")).await.unwrap();
    assert!(first.id < second.id);

    let (_tx, shutdown) = watch::channel(false);
    dispatcher.run_cycle(&shutdown).await.unwrap();

    let seen: Vec<i64> = log.lock().unwrap().iter().map(|(_, id)| *id).collect();
    assert_eq!(seen, vec![first.id, second.id]);
}

#[tokio::test]
async fn listeners_run_in_registration_order() {
    let store = Arc::new(MemEventStore::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = Dispatcher::new(store.clone(), test_config(5));
    dispatcher.register(Box::new(Recording {
        name: "first",
        log: log.clone(),
    }));
    dispatcher.register(Box::new(Recording {
        name: "second",
        log: log.clone(),
    }));

    let event = store.append(owner_created("42")).await.unwrap();

    let (_tx, shutdown) = watch::channel(false);
    dispatcher.run_cycle(&shutdown).await.unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("first".to_string(), event.id),
            ("second".to_string(), event.id)
        ]
    );
}

// =========================================================================
// Failure isolation
// =========================================================================

#[tokio::test]
async fn one_bad_record_does_not_block_the_batch() {
    let store = Arc::new(MemEventStore::new());

    let mut dispatcher = Dispatcher::new(store.clone(), test_config(5));
    dispatcher.register(Box::new(FailsFor { entity_id: "bad" }));

    store.append(owner_created("bad")).await.unwrap();
    store.append(owner_created("good")).await.unwrap();

    let (_tx, shutdown) = watch::channel(false);
    let stats = dispatcher.run_cycle(&shutdown).await.unwrap();
    assert_eq!(stats.fetched, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.retried, 1);

    let all = store.all();
    assert_eq!(all[0].status, DeliveryStatus::Pending);
    assert_eq!(all[0].retry_count, 1);
    assert_eq!(all[1].status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn record_is_delivered_only_when_all_listeners_succeed() {
    let store = Arc::new(MemEventStore::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = Dispatcher::new(store.clone(), test_config(5));
    dispatcher.register(Box::new(Recording {
        name: "recording",
        log: log.clone(),
    }));
    dispatcher.register(Box::new(AlwaysFails {
        calls: calls.clone(),
    }));

    store.append(owner_created("42")).await.unwrap();

    let (_tx, shutdown) = watch::channel(false);
    dispatcher.run_cycle(&shutdown).await.unwrap();

    // First listener saw it (at-least-once), but the record is not delivered.
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(store.all()[0].status, DeliveryStatus::Pending);
    assert_eq!(store.all()[0].retry_count, 1);
}

#[tokio::test]
async fn hung_listener_times_out_and_counts_as_failure() {
    let store = Arc::new(MemEventStore::new());

    let mut config = test_config(5);
    config.listener_timeout = Duration::from_millis(50);

    let mut dispatcher = Dispatcher::new(store.clone(), config);
    dispatcher.register(Box::new(Hangs));

    store.append(owner_created("42")).await.unwrap();

    let (_tx, shutdown) = watch::channel(false);
    let stats = dispatcher.run_cycle(&shutdown).await.unwrap();
    assert_eq!(stats.retried, 1);

    let all = store.all();
    assert_eq!(all[0].status, DeliveryStatus::Pending);
    assert!(all[0]
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("timed out"));
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn run_stops_on_shutdown_signal() {
    let store = Arc::new(MemEventStore::new());
    let mut dispatcher = Dispatcher::new(store.clone(), test_config(5));
    dispatcher.register(Box::new(sconce_dispatcher::LogListener));

    store.append(owner_created("42")).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(dispatcher.run(shutdown_rx));

    // Give it a moment to process, then stop it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .expect("dispatcher did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(store.all()[0].status, DeliveryStatus::Delivered);
}
