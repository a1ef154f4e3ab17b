//! Queue-to-store consumer.
//!
//! [`OrderConsumer`] drains the billing queue into an [`OrderStore`], one
//! message at a time. Each delivery walks
//! `Received → Decoding → Validating → Persisting → Acknowledging`, and the
//! exit from that walk is turned into an ack or nack by
//! [`decide`](billing_queue_core::decide).
//!
//! # Pattern: Subscribe-Process-Resubscribe Loop
//!
//! ```text
//! loop {
//!     consume(prefetch = 1):
//!         loop {
//!             wait for delivery OR shutdown
//!             process delivery to completion
//!         }
//!     if stream ended or errored:
//!         wait retry_delay, resubscribe
//! }
//! ```
//!
//! Shutdown is only observed between deliveries. A delivery that has been
//! received is always processed and settled before the loop checks again.

use crate::metrics::ConsumerMetrics;
use billing_queue_core::disposition::{decide, decode, Disposition, Outcome};
use billing_queue_core::order::{Order, OrderId};
use billing_queue_core::order_store::{OrderStore, OrderStoreError};
use billing_queue_core::queue::{Delivery, DeliveryStream, MessageQueue, QueueError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// At most one unacknowledged delivery per consumer.
pub const PREFETCH: u16 = 1;

/// Default deadline for a single `create_order` call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait before resubscribing after the delivery stream ends.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors that interrupt a subscription. The consumer logs them and resubscribes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// Starting the subscription failed.
    #[error("failed to subscribe: {0}")]
    Subscribe(QueueError),

    /// The delivery stream yielded an error.
    #[error("delivery stream failed: {0}")]
    Stream(QueueError),
}

/// How a subscription ended.
enum StreamEnd {
    Shutdown,
    Exhausted,
}

/// Consumes billing messages and persists them as orders.
///
/// # Lifecycle
///
/// 1. Created via [`new`](Self::new)
/// 2. Spawned as background task via [`spawn`](Self::spawn) (or driven with [`run`](Self::run))
/// 3. Runs until a shutdown signal is received
pub struct OrderConsumer {
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn OrderStore>,
    shutdown: broadcast::Receiver<()>,
    store_timeout: Duration,
    retry_delay: Duration,
}

impl OrderConsumer {
    /// Create a consumer with the default store deadline and retry delay.
    #[must_use]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn OrderStore>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            queue,
            store,
            shutdown,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the per-message store deadline.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Override the resubscribe delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the receive loop until shutdown.
    pub async fn run(&mut self) {
        let queue = self.queue.queue_name().to_string();
        info!(queue = %queue, prefetch = PREFETCH, "Order consumer started");

        loop {
            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => break,
                result = self.queue.consume(PREFETCH) => result.map_err(ConsumerError::Subscribe),
            };

            let ended = match subscribed {
                Ok(mut stream) => {
                    info!(queue = %queue, "Subscribed to queue");
                    self.process_stream(&mut stream).await
                }
                Err(e) => Err(e),
            };

            match ended {
                Ok(StreamEnd::Shutdown) => break,
                Ok(StreamEnd::Exhausted) => {
                    warn!(queue = %queue, "Delivery stream ended, resubscribing in {:?}", self.retry_delay);
                }
                Err(e) => {
                    error!(queue = %queue, error = %e, "Consumer error, resubscribing in {:?}", self.retry_delay);
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(queue = %queue, "Order consumer stopped");
    }

    async fn process_stream(&mut self, stream: &mut DeliveryStream) -> Result<StreamEnd, ConsumerError> {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Order consumer received shutdown signal");
                    return Ok(StreamEnd::Shutdown);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.process(delivery).await;
                }
                Some(Err(e)) => return Err(ConsumerError::Stream(e)),
                None => return Ok(StreamEnd::Exhausted),
            }
        }
    }

    /// Process one delivery to completion and settle it with the broker.
    ///
    /// Never fails: decode and store errors become a nack, and an
    /// acknowledgement that cannot be delivered is logged. Returns the outcome
    /// that determined the settlement.
    pub async fn process(&self, delivery: Delivery) -> Outcome {
        let delivery_tag = delivery.delivery_tag;
        let outcome = self.evaluate(&delivery).await;
        let disposition = decide(&outcome);

        match disposition {
            Disposition::Ack => ConsumerMetrics::record_acked(),
            Disposition::Nack { requeue: true } => ConsumerMetrics::record_requeued(),
            Disposition::Nack { requeue: false } => {
                ConsumerMetrics::record_discarded(discard_reason(&outcome));
            }
        }

        if let Err(e) = delivery.settle(disposition).await {
            error!(
                delivery_tag,
                disposition = disposition.as_str(),
                error = %e,
                "Failed to settle delivery"
            );
            ConsumerMetrics::record_ack_failed();
        }

        outcome
    }

    async fn evaluate(&self, delivery: &Delivery) -> Outcome {
        let delivery_tag = delivery.delivery_tag;

        let request = match decode(&delivery.payload) {
            Ok(request) => request,
            Err(err) => {
                error!(
                    delivery_tag,
                    redelivered = delivery.redelivered,
                    error = %err,
                    body = %String::from_utf8_lossy(&delivery.payload),
                    "Discarding unprocessable message"
                );
                return Outcome::Rejected(err);
            }
        };

        let order = Order::new(OrderId::new(), request);
        let created = match tokio::time::timeout(self.store_timeout, self.store.create_order(&order)).await {
            Ok(result) => result,
            Err(_) => Err(OrderStoreError::Timeout(self.store_timeout)),
        };

        match created {
            Ok(()) => {
                info!(
                    delivery_tag,
                    order_id = %order.id,
                    user_id = %order.user_id,
                    "Order stored"
                );
                Outcome::Stored(order.id)
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    delivery_tag,
                    user_id = %order.user_id,
                    error = %err,
                    requeue = true,
                    "Failed to store order"
                );
                Outcome::StoreFailed(err)
            }
            Err(err) => {
                error!(
                    delivery_tag,
                    user_id = %order.user_id,
                    error = %err,
                    requeue = false,
                    "Order rejected by store"
                );
                Outcome::StoreFailed(err)
            }
        }
    }
}

const fn discard_reason(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Rejected(err) => err.reason(),
        Outcome::StoreFailed(_) => "store rejected",
        Outcome::Stored(_) => "stored",
    }
}
