//! Asynchronous delivery of audit records to external listeners.
//!
//! The store is the queue: pending rows are claimed in id order, pushed
//! through the registered listeners, and marked delivered or retried with
//! bounded backoff. At-least-once — listeners are expected to be idempotent.

pub mod dispatcher;
pub mod listener;
pub mod webhook;

pub use dispatcher::{CycleStats, Dispatcher, DispatcherConfig};
pub use listener::{EventListener, LogListener};
pub use webhook::WebhookListener;
