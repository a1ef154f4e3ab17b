//! Billing worker.
//!
//! Drains the billing queue into `PostgreSQL`, one message at a time, and
//! serves the stored orders on `GET /api/orders`.
//!
//! Startup order: database (ping + schema), broker, consumer, HTTP. Any
//! failure before the consumer starts is fatal.
//!
//! # Usage
//!
//! ```bash
//! BILLING_DB_HOST=localhost RABBITMQ_HOST=localhost cargo run --bin billing-worker
//! ```

use anyhow::Context;
use billing_queue_amqp::AmqpQueue;
use billing_queue_core::queue::MessageQueue;
use billing_queue_postgres::PostgresOrderStore;
use billing_queue_runtime::shutdown::{GenericShutdownHandler, TaskShutdownHandler};
use billing_queue_runtime::{wait_for_signal, OrderConsumer, ShutdownCoordinator};
use billing_queue_server::{init_tracing, spawn_http, start_metrics, Config};
use billing_queue_web::{billing_router, BillingState};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env();
    tracing::info!(
        broker = %config.amqp.endpoint(),
        queue = %config.amqp.queue,
        database = %config.postgres.database,
        address = %config.http.billing_addr(),
        "Starting billing worker"
    );

    let store = PostgresOrderStore::connect(&config.postgres)
        .await
        .context("order database unavailable")?;
    tokio::time::timeout(config.postgres.connect_timeout, store.ping())
        .await
        .context("order database ping timed out")?
        .context("order database ping failed")?;
    store
        .ensure_schema()
        .await
        .context("failed to create orders table")?;

    let queue = Arc::new(
        AmqpQueue::connect(&config.amqp, &config.connect_retry)
            .await
            .context("broker unavailable")?,
    );

    let mut coordinator = ShutdownCoordinator::new(config.timeouts.shutdown);

    let metrics = start_metrics(&config, coordinator.subscribe()).await?;

    let consumer = OrderConsumer::new(queue.clone(), Arc::new(store.clone()), coordinator.subscribe())
        .with_store_timeout(config.timeouts.store)
        .spawn();

    let listener = TcpListener::bind(config.http.billing_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.http.billing_addr()))?;
    let server = spawn_http(
        "billing-service",
        listener,
        billing_router(BillingState::new(Arc::new(store.clone()))),
        coordinator.subscribe(),
    );

    // Order matters: the consumer settles its in-flight message before the
    // channel closes, and the pool outlives every query.
    coordinator.register(Arc::new(TaskShutdownHandler::new("order-consumer", consumer)));
    coordinator.register(Arc::new(TaskShutdownHandler::new("http-server", server)));
    if let Some(metrics) = metrics {
        coordinator.register(Arc::new(TaskShutdownHandler::new("metrics-server", metrics)));
    }
    coordinator.register(Arc::new(GenericShutdownHandler::new(
        "amqp-connection".to_string(),
        move || {
            let queue = queue.clone();
            async move { queue.close().await.map_err(|e| e.to_string()) }
        },
    )));
    coordinator.register(Arc::new(GenericShutdownHandler::new(
        "order-database".to_string(),
        move || {
            let store = store.clone();
            async move {
                store.close().await;
                Ok(())
            }
        },
    )));

    wait_for_signal().await;

    coordinator
        .shutdown()
        .await
        .map_err(|errors| anyhow::anyhow!("shutdown incomplete: {}", errors.join("; ")))?;

    tracing::info!("Billing worker stopped");
    Ok(())
}
