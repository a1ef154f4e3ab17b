//! HTTP-side billing producer.
//!
//! [`BillingProducer::submit`] takes the raw request body and either
//! publishes it, byte for byte, as a persistent message or reports why it
//! did not. The producer never retries a publish; a failed submit must be
//! assumed not queued, and retrying is the HTTP client's call.

use crate::metrics::ProducerMetrics;
use billing_queue_core::environment::Clock;
use billing_queue_core::message::QueueMessage;
use billing_queue_core::order::{BillingRequest, PayloadError};
use billing_queue_core::queue::{MessageQueue, QueueError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default deadline for a single publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a billing request was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The body was not a valid billing request. Nothing was published.
    #[error("{}", .0.reason())]
    RejectedInput(PayloadError),

    /// The broker did not take the message within the deadline.
    #[error("failed to publish message: {0}")]
    PublishFailed(QueueError),
}

impl SubmitError {
    /// Whether the caller sent bad input, as opposed to the broker failing.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::RejectedInput(_))
    }
}

/// A billing request the broker has taken responsibility for.
///
/// Acceptance is not completion: whether an order is eventually stored is
/// not observable from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Queue the message was published to.
    pub queue: String,
    /// Timestamp attached to the published message.
    pub published_at: DateTime<Utc>,
}

/// Validates billing requests and publishes them to the durable queue.
///
/// Cloning is cheap; every clone shares the same queue handle.
#[derive(Clone)]
pub struct BillingProducer {
    queue: Arc<dyn MessageQueue>,
    clock: Arc<dyn Clock>,
    publish_timeout: Duration,
}

impl BillingProducer {
    /// Create a producer with the default publish deadline.
    #[must_use]
    pub fn new(queue: Arc<dyn MessageQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            clock,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Override the publish deadline.
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Name of the queue this producer publishes to.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        self.queue.queue_name()
    }

    /// Validate `raw_body` and publish it as a persistent JSON message.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::RejectedInput`] if the body is not a JSON object or a
    ///   required field is missing or empty; no publish is attempted
    /// - [`SubmitError::PublishFailed`] if the broker errors or the publish
    ///   does not complete within the deadline
    pub async fn submit(&self, raw_body: &[u8]) -> Result<Accepted, SubmitError> {
        let request = match BillingRequest::parse(raw_body) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "Rejected billing request");
                ProducerMetrics::record_rejected(err.reason());
                return Err(SubmitError::RejectedInput(err));
            }
        };

        let published_at = self.clock.now();
        let message = QueueMessage::json(raw_body.to_vec(), published_at);
        let queue = self.queue.queue_name().to_string();

        let result = match tokio::time::timeout(self.publish_timeout, self.queue.publish(&message)).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::PublishTimeout {
                queue: queue.clone(),
                timeout: self.publish_timeout,
            }),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    queue = %queue,
                    user_id = %request.user_id,
                    "Billing message published"
                );
                ProducerMetrics::record_published();
                Ok(Accepted {
                    queue,
                    published_at,
                })
            }
            Err(err) => {
                tracing::error!(
                    queue = %queue,
                    user_id = %request.user_id,
                    error = %err,
                    "Failed to publish billing message"
                );
                ProducerMetrics::record_publish_failed();
                Err(SubmitError::PublishFailed(err))
            }
        }
    }
}

impl std::fmt::Debug for BillingProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingProducer")
            .field("queue", &self.queue.queue_name())
            .field("publish_timeout", &self.publish_timeout)
            .finish_non_exhaustive()
    }
}
