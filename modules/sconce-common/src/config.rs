//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use tracing::info;

/// Runtime configuration for the Sconce backend services.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Dispatcher tuning
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub listener_timeout: Duration,
    pub max_attempts: i32,

    // Delivery targets (comma-separated URLs, may be empty)
    pub webhook_urls: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            batch_size: parsed_env("DISPATCH_BATCH_SIZE", 50),
            poll_interval: Duration::from_secs(parsed_env("DISPATCH_POLL_INTERVAL_SECS", 5)),
            listener_timeout: Duration::from_secs(parsed_env("LISTENER_TIMEOUT_SECS", 30)),
            max_attempts: parsed_env("DISPATCH_MAX_ATTEMPTS", 5),
            webhook_urls: env::var("AUDIT_WEBHOOK_URLS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Log the non-secret parts of the config at startup.
    pub fn log_redacted(&self) {
        info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            listener_timeout_secs = self.listener_timeout.as_secs(),
            max_attempts = self.max_attempts,
            webhook_count = self.webhook_urls.len(),
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("Missing required environment variable: {key}"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got '{raw}'")),
        Err(_) => default,
    }
}
