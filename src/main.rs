use actix_web::web;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_ingest::cache::{CacheConfig, OrderCache};
use order_ingest::config::Config;
use order_ingest::http::{self, AppState};
use order_ingest::ingest::OrderIngestor;
use order_ingest::messaging::OrderSubscriber;
use order_ingest::metrics::Metrics;
use order_ingest::service::OrderService;
use order_ingest::store::{OrderStore, PgOrderStore};
use order_ingest::utils::retry::{retry_with_backoff, RetryConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, debug for this crate; override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_ingest=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order ingestion service");

    let config = Config::load()?;

    // === 1. PostgreSQL pool + schema ===
    tracing::info!("Connecting to PostgreSQL...");
    let pg = retry_with_backoff(&RetryConfig::startup(), |_| {
        PgOrderStore::connect(&config.database)
    })
    .await
    .into_result()?;
    pg.ensure_schema().await?;
    let store: Arc<dyn OrderStore> = Arc::new(pg);

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        metrics.registry().gather().len()
    );

    // === 3. Cache warm-up, before anything can read or write ===
    let cache = Arc::new(OrderCache::new(CacheConfig {
        ttl: config.cache_ttl(),
    }));
    let warmed = cache.warm_up(store.as_ref()).await?;
    metrics.set_cache_entries(warmed);

    // === 4. Subscriber ===
    let ingestor = Arc::new(OrderIngestor::new(
        store.clone(),
        cache.clone(),
        metrics.clone(),
        config.ingest.retry.clone(),
        config.store_timeout(),
    ));
    let subscriber = OrderSubscriber::new(&config.kafka, &config.ingest, metrics.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let subscriber_task = tokio::spawn(subscriber.run(ingestor, shutdown_rx));

    // === 5. HTTP server, runs until SIGINT/SIGTERM ===
    let service = Arc::new(OrderService::new(
        store,
        cache,
        metrics.clone(),
        config.store_timeout(),
    ));
    let state = web::Data::new(AppState { service, metrics });
    let served = http::run_server(config.http_addr(), state).await;

    tracing::info!("Shutting down subscriber");
    let _ = shutdown_tx.send(true);
    if let Err(e) = subscriber_task.await {
        tracing::error!(error = %e, "Subscriber task ended abnormally");
    }

    served?;
    tracing::info!("👋 Order ingestion service stopped");
    Ok(())
}
