//! Prometheus metrics for the producer and consumer paths.
//!
//! Recording goes through the `metrics` facade, so counters are no-ops until a
//! recorder is installed. Binaries install one with [`MetricsServer::start`]
//! when a metrics port is configured.
//!
//! # Example
//!
//! ```rust,no_run
//! use billing_queue_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint should bind to.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should listen on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the recorder cannot be installed.
    /// An already-installed recorder (as in tests) is tolerated with a warning.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                register_metrics();
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Handle for rendering, once started.
    #[must_use]
    pub fn handle(&self) -> Option<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "billing.producer.published",
        "Billing messages durably published"
    );
    describe_counter!(
        "billing.producer.rejected",
        "Billing requests rejected before publish, by reason"
    );
    describe_counter!(
        "billing.producer.publish_failed",
        "Billing requests whose publish failed or timed out"
    );
    describe_counter!("billing.consumer.acked", "Deliveries stored and acknowledged");
    describe_counter!(
        "billing.consumer.discarded",
        "Deliveries rejected without requeue, by reason"
    );
    describe_counter!(
        "billing.consumer.requeued",
        "Deliveries returned to the queue after a transient failure"
    );
    describe_counter!(
        "billing.consumer.ack_failed",
        "Acknowledgements the broker never received"
    );
    describe_counter!(
        "billing.store.orders_created",
        "Orders committed to the order store"
    );
}

/// Producer metrics recorder.
pub struct ProducerMetrics;

impl ProducerMetrics {
    /// Record a durable publish.
    pub fn record_published() {
        counter!("billing.producer.published").increment(1);
    }

    /// Record a request rejected as client input.
    pub fn record_rejected(reason: &'static str) {
        counter!("billing.producer.rejected", "reason" => reason).increment(1);
    }

    /// Record a failed or timed-out publish.
    pub fn record_publish_failed() {
        counter!("billing.producer.publish_failed").increment(1);
    }
}

/// Consumer metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a positive acknowledgement.
    pub fn record_acked() {
        counter!("billing.consumer.acked").increment(1);
    }

    /// Record a discard (`nack` without requeue).
    pub fn record_discarded(reason: &'static str) {
        counter!("billing.consumer.discarded", "reason" => reason).increment(1);
    }

    /// Record a requeue.
    pub fn record_requeued() {
        counter!("billing.consumer.requeued").increment(1);
    }

    /// Record an acknowledgement that failed to reach the broker.
    pub fn record_ack_failed() {
        counter!("billing.consumer.ack_failed").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[test]
    fn test_recorded_counters_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            ProducerMetrics::record_published();
            ProducerMetrics::record_rejected("invalid JSON");
            ConsumerMetrics::record_acked();
            counter!("billing.store.orders_created").increment(1);
        });

        let rendered = handle.render();
        assert!(rendered.contains("billing_producer_published 1"));
        assert!(rendered.contains(r#"billing_producer_rejected{reason="invalid JSON"} 1"#));
        assert!(rendered.contains("billing_consumer_acked 1"));
        assert!(rendered.contains("billing_store_orders_created 1"));
        assert!(rendered
            .contains("# HELP billing_store_orders_created Orders committed to the order store"));
    }
}
