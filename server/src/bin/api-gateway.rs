//! API gateway.
//!
//! Accepts billing requests over HTTP and publishes them to the durable
//! billing queue. An HTTP 200 means the broker has confirmed the message.
//!
//! # Usage
//!
//! ```bash
//! RABBITMQ_HOST=localhost API_GATEWAY_PORT=3000 cargo run --bin api-gateway
//! ```

use anyhow::Context;
use billing_queue_amqp::AmqpQueue;
use billing_queue_core::environment::SystemClock;
use billing_queue_core::queue::MessageQueue;
use billing_queue_runtime::shutdown::{GenericShutdownHandler, TaskShutdownHandler};
use billing_queue_runtime::{wait_for_signal, BillingProducer, ShutdownCoordinator};
use billing_queue_server::{init_tracing, spawn_http, start_metrics, Config};
use billing_queue_web::{gateway_router, GatewayState};
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
        address = %config.http.gateway_addr(),
        "Starting API gateway"
    );

    let mut coordinator = ShutdownCoordinator::new(config.timeouts.shutdown);

    let metrics = start_metrics(&config, coordinator.subscribe()).await?;

    let queue = Arc::new(
        AmqpQueue::connect(&config.amqp, &config.connect_retry)
            .await
            .context("broker unavailable")?,
    );

    let producer = BillingProducer::new(queue.clone(), Arc::new(SystemClock))
        .with_publish_timeout(config.timeouts.publish);

    let listener = TcpListener::bind(config.http.gateway_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.http.gateway_addr()))?;
    let server = spawn_http(
        "api-gateway",
        listener,
        gateway_router(GatewayState::new(producer)),
        coordinator.subscribe(),
    );

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

    wait_for_signal().await;

    coordinator
        .shutdown()
        .await
        .map_err(|errors| anyhow::anyhow!("shutdown incomplete: {}", errors.join("; ")))?;

    tracing::info!("API gateway stopped");
    Ok(())
}
