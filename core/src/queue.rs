//! Message queue abstraction for the producer/consumer hand-off.
//!
//! This module provides the [`MessageQueue`] trait for publishing billing
//! messages to a single named durable queue and consuming them back with
//! manual acknowledgement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  HTTP Producer  │
//! └────────┬────────┘
//!          │ publish (persistent)
//!          ▼
//! ┌─────────────────┐
//! │  Durable Queue  │◄─── Broker owns the message until acked
//! └────────┬────────┘
//!          │ consume (prefetch 1)
//!          ▼
//! ┌─────────────────┐
//! │    Consumer     │──► ack / nack(requeue)
//! └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Durability**: messages are published persistent to a durable queue
//! - **At-least-once delivery**: a message may be delivered more than once
//! - **Manual acknowledgement**: every [`Delivery`] must be settled exactly once
//! - **Owned connections**: each role opens its own connection; nothing is shared
//!
//! # Implementations
//!
//! - `AmqpQueue` (in `billing-queue-amqp`): RabbitMQ, for production
//! - `InMemoryQueue` (in `billing-queue-testing`): spy for tests

use crate::disposition::Disposition;
use crate::message::QueueMessage;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The broker could not be reached within the connection retry budget.
    ///
    /// Fatal to process startup.
    #[error("Broker unavailable after {attempts} attempts: {reason}")]
    Unavailable {
        /// Number of connection attempts made
        attempts: usize,
        /// Error from the last attempt
        reason: String,
    },

    /// The queue exists with properties incompatible with ours.
    ///
    /// Fatal to process startup.
    #[error("Queue '{queue}' configuration conflict: {reason}")]
    ConfigurationConflict {
        /// Queue name
        queue: String,
        /// Broker-reported reason
        reason: String,
    },

    /// Failed to open a channel or declare the queue for reasons other than a conflict.
    #[error("Queue setup failed: {0}")]
    SetupFailed(String),

    /// The broker refused or failed the publish.
    #[error("Publish failed for queue '{queue}': {reason}")]
    PublishFailed {
        /// Queue name
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// The publish did not complete within its deadline.
    #[error("Publish to queue '{queue}' timed out after {timeout:?}")]
    PublishTimeout {
        /// Queue name
        queue: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// Failed to start consuming or to receive a delivery.
    #[error("Consume failed for queue '{queue}': {reason}")]
    ConsumeFailed {
        /// Queue name
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to send an ack or nack.
    #[error("Acknowledgement failed for delivery {delivery_tag}: {reason}")]
    AckFailed {
        /// Broker-assigned delivery tag
        delivery_tag: u64,
        /// The reason for failure
        reason: String,
    },

    /// Channel or connection already closed.
    #[error("Queue connection closed: {0}")]
    Closed(String),
}

/// Stream of deliveries from a consume call.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, QueueError>> + Send>>;

/// Sends acknowledgements for one delivery back to the broker.
///
/// Implementations hold whatever handle the broker needs (channel, delivery
/// tag). A delivery is settled through [`Delivery::settle`], which consumes
/// the delivery so it cannot be settled twice.
pub trait Acknowledger: Send + Sync {
    /// Positively acknowledge: the broker deletes the message.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AckFailed`] if the channel is gone.
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;

    /// Negatively acknowledge, either requeueing or discarding the message.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AckFailed`] if the channel is gone.
    fn nack(
        &self,
        requeue: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;
}

/// One message handed to a consumer, awaiting acknowledgement.
pub struct Delivery {
    /// Broker-assigned tag, unique per channel.
    pub delivery_tag: u64,
    /// Message payload.
    pub payload: Vec<u8>,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Create a delivery with the acknowledger that settles it.
    #[must_use]
    pub fn new(
        delivery_tag: u64,
        payload: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            payload,
            redelivered,
            acker,
        }
    }

    /// Carry out a disposition decided for this delivery.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AckFailed`] if the broker could not be told.
    pub async fn settle(self, disposition: Disposition) -> Result<(), QueueError> {
        match disposition {
            Disposition::Ack => self.acker.ack().await,
            Disposition::Nack { requeue } => self.acker.nack(requeue).await,
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

/// Trait for message queue implementations.
///
/// One instance is bound to one named durable queue and owns its own
/// connection and channel. Producer and consumer processes each construct
/// their own instance.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn MessageQueue>`), which lets the HTTP
/// layer and the consumer loop stay independent of the broker implementation.
pub trait MessageQueue: Send + Sync {
    /// Name of the queue this instance is bound to.
    fn queue_name(&self) -> &str;

    /// Publish a message to the queue.
    ///
    /// Returns only once the broker has taken responsibility for the message.
    /// Callers bound this with their own deadline.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::PublishFailed`] if the broker refuses the message
    /// or the channel is closed.
    fn publish(
        &self,
        message: &QueueMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;

    /// Start consuming with manual acknowledgement.
    ///
    /// `prefetch` caps the number of unacknowledged deliveries the broker
    /// may hand to this consumer at once.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ConsumeFailed`] if the subscription cannot be set up.
    fn consume(
        &self,
        prefetch: u16,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>>;

    /// Close the channel and connection.
    ///
    /// Unacknowledged deliveries return to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if closing fails.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;
}
