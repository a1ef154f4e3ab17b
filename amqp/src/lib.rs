//! RabbitMQ message queue for the billing pipeline.
//!
//! This crate provides [`AmqpQueue`], the production implementation of the
//! [`MessageQueue`] trait from `billing-queue-core`, built on lapin.
//!
//! # Delivery Semantics
//!
//! - **Durable queue**: declared durable, not exclusive, not auto-deleted
//! - **Persistent messages**: published with delivery mode 2 and publisher
//!   confirms, so `publish` returns only after the broker has the message
//! - **Manual acknowledgement**: every delivery carries a lapin acker; the
//!   message leaves the queue only on a positive ack
//! - **Owned connection**: each `AmqpQueue` owns one connection and one
//!   channel; producer and consumer processes never share them
//!
//! # Example
//!
//! ```no_run
//! use billing_queue_amqp::{AmqpConfig, AmqpQueue};
//! use billing_queue_core::queue::MessageQueue;
//! use billing_queue_runtime::retry::RetryPolicy;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = AmqpQueue::connect(&AmqpConfig::default(), &RetryPolicy::connect_default()).await?;
//! let mut deliveries = queue.consume(1).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;

pub use config::{AmqpConfig, DEFAULT_QUEUE_NAME};

use billing_queue_core::message::QueueMessage;
use billing_queue_core::queue::{Acknowledger, Delivery, DeliveryStream, MessageQueue, QueueError};
use billing_queue_runtime::retry::{retry_with_backoff, RetryPolicy};
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::future::Future;
use std::pin::Pin;

/// AMQP delivery mode for messages written to disk.
const PERSISTENT: u8 = 2;

/// Reply code sent with a normal close.
const REPLY_SUCCESS: u16 = 200;

/// RabbitMQ-backed [`MessageQueue`] bound to one durable queue.
pub struct AmqpQueue {
    connection: Connection,
    channel: Channel,
    queue: String,
}

impl AmqpQueue {
    /// Connect to the broker with bounded retry, then declare the queue.
    ///
    /// Every failed connection attempt is logged with its attempt number.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Unavailable`] once every attempt allowed by `policy` has failed
    /// - [`QueueError::ConfigurationConflict`] if the queue exists with other properties
    /// - [`QueueError::SetupFailed`] if the channel cannot be opened or configured
    pub async fn connect(config: &AmqpConfig, policy: &RetryPolicy) -> Result<Self, QueueError> {
        let endpoint = config.endpoint();
        tracing::info!(
            endpoint = %endpoint,
            max_attempts = policy.max_attempts,
            "Connecting to broker"
        );

        let connection = retry_with_backoff(policy, || {
            Connection::connect_uri(config.uri(), connection_properties())
        })
        .await
        .map_err(|e| QueueError::Unavailable {
            attempts: policy.max_attempts,
            reason: e.to_string(),
        })?;

        let channel = close_on_failure(open_channel(&connection, &config.queue).await, || {
            connection.close(REPLY_SUCCESS, "Setup failed")
        })
        .await?;

        tracing::info!(endpoint = %endpoint, queue = %config.queue, "Broker connection ready");

        Ok(Self {
            connection,
            channel,
            queue: config.queue.clone(),
        })
    }
}

async fn open_channel(connection: &Connection, queue: &str) -> Result<Channel, QueueError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| QueueError::SetupFailed(format!("Failed to open channel: {e}")))?;

    declare_queue(&channel, queue).await?;

    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| QueueError::SetupFailed(format!("Failed to enable publisher confirms: {e}")))?;

    Ok(channel)
}

/// Run `close` if setup failed, then hand back the setup result unchanged.
///
/// A failing close is only logged; the setup error is what the caller needs.
async fn close_on_failure<T, C, Fut, E>(result: Result<T, QueueError>, close: C) -> Result<T, QueueError>
where
    C: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    if let Err(setup_error) = &result {
        if let Err(e) = close().await {
            tracing::warn!(
                error = %e,
                setup_error = %setup_error,
                "Failed to close broker connection after setup error"
            );
        }
    }
    result
}

fn connection_properties() -> ConnectionProperties {
    ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio)
}

async fn declare_queue(channel: &Channel, queue: &str) -> Result<(), QueueError> {
    let options = QueueDeclareOptions {
        durable: true,
        exclusive: false,
        auto_delete: false,
        ..QueueDeclareOptions::default()
    };

    channel
        .queue_declare(queue, options, FieldTable::default())
        .await
        .map(|_| ())
        .map_err(|e| {
            if is_precondition_failed(&e) {
                QueueError::ConfigurationConflict {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                }
            } else {
                QueueError::SetupFailed(format!("Failed to declare queue '{queue}': {e}"))
            }
        })
}

fn is_precondition_failed(error: &lapin::Error) -> bool {
    matches!(
        error,
        lapin::Error::ProtocolError(amqp)
            if matches!(amqp.kind(), AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED))
    )
}

#[allow(clippy::cast_sign_loss)]
fn properties_for(message: &QueueMessage) -> BasicProperties {
    let properties = BasicProperties::default()
        .with_content_type(message.content_type.clone().into())
        .with_timestamp(message.timestamp.timestamp().max(0) as u64);

    if message.persistent {
        properties.with_delivery_mode(PERSISTENT)
    } else {
        properties
    }
}

impl MessageQueue for AmqpQueue {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    fn publish(
        &self,
        message: &QueueMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let properties = properties_for(message);
        let payload = message.payload.clone();

        Box::pin(async move {
            let publish_failed = |reason: String| QueueError::PublishFailed {
                queue: self.queue.clone(),
                reason,
            };

            let confirm = self
                .channel
                .basic_publish("", &self.queue, BasicPublishOptions::default(), &payload, properties)
                .await
                .map_err(|e| publish_failed(e.to_string()))?;

            let confirmation = confirm.await.map_err(|e| publish_failed(e.to_string()))?;
            if let Confirmation::Nack(_) = confirmation {
                return Err(publish_failed("broker nacked the message".to_string()));
            }

            tracing::debug!(queue = %self.queue, bytes = payload.len(), "Message confirmed by broker");
            Ok(())
        })
    }

    fn consume(
        &self,
        prefetch: u16,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>> {
        Box::pin(async move {
            let consume_failed = |reason: String| QueueError::ConsumeFailed {
                queue: self.queue.clone(),
                reason,
            };

            self.channel
                .basic_qos(prefetch, BasicQosOptions::default())
                .await
                .map_err(|e| consume_failed(format!("Failed to set prefetch: {e}")))?;

            let consumer = self
                .channel
                .basic_consume(
                    &self.queue,
                    "",
                    BasicConsumeOptions {
                        no_ack: false,
                        ..BasicConsumeOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| consume_failed(format!("Failed to start consumer: {e}")))?;

            tracing::info!(
                queue = %self.queue,
                prefetch,
                consumer_tag = %consumer.tag().as_str(),
                "Consuming with manual acknowledgement"
            );

            let queue = self.queue.clone();
            let stream = consumer.map(move |result| match result {
                Ok(delivery) => {
                    let acker = LapinAcker {
                        acker: delivery.acker,
                        delivery_tag: delivery.delivery_tag,
                    };
                    Ok(Delivery::new(
                        delivery.delivery_tag,
                        delivery.data,
                        delivery.redelivered,
                        Box::new(acker),
                    ))
                }
                Err(e) => Err(QueueError::ConsumeFailed {
                    queue: queue.clone(),
                    reason: e.to_string(),
                }),
            });

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move {
            let channel_result = self.channel.close(REPLY_SUCCESS, "Bye").await;
            let connection_result = self.connection.close(REPLY_SUCCESS, "Bye").await;

            channel_result
                .and(connection_result)
                .map_err(|e| QueueError::Closed(e.to_string()))?;

            tracing::info!(queue = %self.queue, "Broker channel and connection closed");
            Ok(())
        })
    }
}

impl std::fmt::Debug for AmqpQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpQueue")
            .field("queue", &self.queue)
            .field("status", &self.connection.status().state())
            .finish_non_exhaustive()
    }
}

/// Settles one lapin delivery.
struct LapinAcker {
    acker: Acker,
    delivery_tag: u64,
}

impl LapinAcker {
    fn ack_failed(&self, error: &lapin::Error) -> QueueError {
        QueueError::AckFailed {
            delivery_tag: self.delivery_tag,
            reason: error.to_string(),
        }
    }
}

impl Acknowledger for LapinAcker {
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move {
            self.acker
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| self.ack_failed(&e))
        })
    }

    fn nack(
        &self,
        requeue: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move {
            self.acker
                .nack(BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                })
                .await
                .map_err(|e| self.ack_failed(&e))
        })
    }
}
