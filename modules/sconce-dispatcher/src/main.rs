use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sconce_audit::{migrate, PgEventStore, RetryPolicy};
use sconce_common::Config;
use sconce_dispatcher::{Dispatcher, DispatcherConfig, EventListener, LogListener, WebhookListener};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sconce=info".parse()?))
        .init();

    info!("Sconce audit dispatcher starting...");

    // Load config
    let config = Config::from_env();
    config.log_redacted();

    // Connect to Postgres
    let pool = PgPool::connect(&config.database_url).await?;

    // Apply schema (idempotent)
    migrate(&pool).await?;

    let store = PgEventStore::new(pool);

    let dispatcher_config = DispatcherConfig {
        batch_size: config.batch_size,
        poll_interval: config.poll_interval,
        listener_timeout: config.listener_timeout,
        retry: RetryPolicy {
            max_attempts: config.max_attempts,
            ..RetryPolicy::default()
        },
        category: None,
    };

    let mut dispatcher = Dispatcher::new(store, dispatcher_config);

    // Listener registration is fixed for the process lifetime. Webhooks if
    // configured, otherwise deliveries go to the log.
    if config.webhook_urls.is_empty() {
        info!("No AUDIT_WEBHOOK_URLS set, delivering to log only");
        dispatcher.register(Box::new(LogListener));
    } else {
        for (i, url) in config.webhook_urls.iter().enumerate() {
            info!(url = url.as_str(), "Webhook listener registered");
            let listener: Box<dyn EventListener> =
                Box::new(WebhookListener::new(format!("webhook-{i}"), url));
            dispatcher.register(listener);
        }
    }

    // Run until ctrl-c
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(dispatcher.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, finishing current record");
    let _ = shutdown_tx.send(true);

    worker.await??;
    Ok(())
}
