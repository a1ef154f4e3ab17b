//! Process lifecycle shared by both binaries.
//!
//! # Graceful Shutdown
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM), the binary calls
//! [`ShutdownCoordinator::shutdown`](billing_queue_runtime::ShutdownCoordinator::shutdown):
//! 1. Shutdown signal broadcast to every subscriber (HTTP servers, consumer)
//! 2. HTTP servers stop accepting connections and drain in-flight requests
//! 3. Registered handlers run in order: background tasks first, then the
//!    broker connection, then the database pool

use crate::config::Config;
use axum::{routing::get, Router};
use billing_queue_runtime::metrics::MetricsServer;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "billing_queue=info,tower_http=info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Serve `app` until a value (or a closed channel) arrives on `shutdown`.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve_until_shutdown(
    listener: TcpListener,
    app: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

/// Spawn [`serve_until_shutdown`] as a task that logs its own failure.
pub fn spawn_http(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(server = name, address = %addr, "HTTP server listening");
    }

    tokio::spawn(async move {
        match serve_until_shutdown(listener, app, shutdown).await {
            Ok(()) => info!(server = name, "HTTP server stopped"),
            Err(e) => error!(server = name, error = %e, "HTTP server failed"),
        }
    })
}

/// Router exposing `GET /metrics` in Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

/// Install the Prometheus recorder and serve it when `METRICS_PORT` is set.
///
/// Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed or the port cannot
/// be bound.
pub async fn start_metrics(
    config: &Config,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    let Some(port) = config.metrics_port else {
        return Ok(None);
    };

    let host = config
        .http
        .host
        .parse::<IpAddr>()
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));
    let mut server = MetricsServer::new(SocketAddr::new(host, port));
    server.start()?;

    let Some(handle) = server.handle() else {
        anyhow::bail!("metrics recorder was not installed");
    };

    let listener = TcpListener::bind(server.addr()).await?;
    Ok(Some(spawn_http("metrics", listener, metrics_router(handle), shutdown)))
}
