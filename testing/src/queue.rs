//! In-memory message queue spy.
//!
//! Behaves like a single durable queue with one consumer:
//!
//! - `publish` records the message and makes it deliverable
//! - `consume` returns a stream of deliveries, starting with any backlog
//! - `nack(requeue = true)` puts the message back with `redelivered = true`
//! - `ack` and `nack(requeue = false)` remove it for good
//!
//! Every publish and settlement is recorded so tests can assert on exactly
//! what reached the broker.

use billing_queue_core::disposition::Disposition;
use billing_queue_core::message::QueueMessage;
use billing_queue_core::queue::{Acknowledger, Delivery, DeliveryStream, MessageQueue, QueueError};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

type DeliverySender = mpsc::UnboundedSender<Result<Delivery, QueueError>>;

/// A settled delivery as observed by the spy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Delivery tag that was settled.
    pub delivery_tag: u64,
    /// Payload of the settled delivery.
    pub payload: Vec<u8>,
    /// Whether the delivery had been redelivered.
    pub redelivered: bool,
    /// How it was settled.
    pub disposition: Disposition,
}

#[derive(Default)]
struct State {
    published: Vec<QueueMessage>,
    settlements: Vec<Settlement>,
    backlog: VecDeque<(Vec<u8>, bool)>,
    consumer: Option<DeliverySender>,
    prefetch: Option<u16>,
    next_tag: u64,
    publish_failure: Option<QueueError>,
    publish_delay: Option<Duration>,
    ack_failure: Option<QueueError>,
    closed: bool,
}

struct Inner {
    name: String,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// In-memory [`MessageQueue`] for tests.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct InMemoryQueue {
    inner: Arc<Inner>,
}

impl InMemoryQueue {
    /// Create an empty queue with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Put a raw payload on the queue as if some producer had published it.
    pub fn enqueue(&self, payload: impl Into<Vec<u8>>) {
        Self::dispatch(&self.inner, payload.into(), false);
    }

    /// Messages accepted by `publish`, in order.
    #[must_use]
    pub fn published(&self) -> Vec<QueueMessage> {
        self.inner.state().published.clone()
    }

    /// Number of accepted publishes.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.inner.state().published.len()
    }

    /// Settlements in the order the consumer sent them.
    #[must_use]
    pub fn settlements(&self) -> Vec<Settlement> {
        self.inner.state().settlements.clone()
    }

    /// Prefetch requested by the most recent `consume` call.
    #[must_use]
    pub fn prefetch(&self) -> Option<u16> {
        self.inner.state().prefetch
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    /// Make every subsequent publish fail with `error`.
    pub fn fail_publishes_with(&self, error: QueueError) {
        self.inner.state().publish_failure = Some(error);
    }

    /// Make every subsequent publish take `delay` before completing.
    pub fn delay_publishes(&self, delay: Duration) {
        self.inner.state().publish_delay = Some(delay);
    }

    /// Make every subsequent ack or nack fail with `error`.
    ///
    /// The settlement is still recorded, mirroring a broker that never saw it.
    pub fn fail_acks_with(&self, error: QueueError) {
        self.inner.state().ack_failure = Some(error);
    }

    /// End the current delivery stream, as a dropped channel would.
    pub fn end_stream(&self) {
        self.inner.state().consumer = None;
    }

    fn dispatch(inner: &Arc<Inner>, payload: Vec<u8>, redelivered: bool) {
        let mut state = inner.state();
        let Some(sender) = state.consumer.clone() else {
            state.backlog.push_back((payload, redelivered));
            return;
        };

        state.next_tag += 1;
        let tag = state.next_tag;
        drop(state);

        let delivery = Self::delivery(inner, tag, payload.clone(), redelivered);
        if sender.send(Ok(delivery)).is_err() {
            let mut state = inner.state();
            state.consumer = None;
            state.backlog.push_back((payload, redelivered));
        }
    }

    fn delivery(inner: &Arc<Inner>, tag: u64, payload: Vec<u8>, redelivered: bool) -> Delivery {
        let acker = InMemoryAcker {
            inner: Arc::clone(inner),
            delivery_tag: tag,
            payload: payload.clone(),
            redelivered,
        };
        Delivery::new(tag, payload, redelivered, Box::new(acker))
    }
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl MessageQueue for InMemoryQueue {
    fn queue_name(&self) -> &str {
        &self.inner.name
    }

    fn publish(
        &self,
        message: &QueueMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let message = message.clone();

        Box::pin(async move {
            let delay = self.inner.state().publish_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            {
                let mut state = self.inner.state();
                if state.closed {
                    return Err(QueueError::Closed("queue closed".to_string()));
                }
                if let Some(err) = state.publish_failure.clone() {
                    return Err(err);
                }
                state.published.push(message.clone());
            }

            Self::dispatch(&self.inner, message.payload, false);
            Ok(())
        })
    }

    fn consume(
        &self,
        prefetch: u16,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, QueueError>> + Send + '_>> {
        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();

            let backlog: Vec<(Vec<u8>, bool)> = {
                let mut state = self.inner.state();
                if state.closed {
                    return Err(QueueError::ConsumeFailed {
                        queue: self.inner.name.clone(),
                        reason: "queue closed".to_string(),
                    });
                }
                state.prefetch = Some(prefetch);
                state.consumer = Some(tx);
                state.backlog.drain(..).collect()
            };

            for (payload, redelivered) in backlog {
                Self::dispatch(&self.inner, payload, redelivered);
            }

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.inner.state();
            state.closed = true;
            state.consumer = None;
            Ok(())
        })
    }
}

struct InMemoryAcker {
    inner: Arc<Inner>,
    delivery_tag: u64,
    payload: Vec<u8>,
    redelivered: bool,
}

impl InMemoryAcker {
    fn record(&self, disposition: Disposition) -> Result<(), QueueError> {
        let mut state = self.inner.state();
        state.settlements.push(Settlement {
            delivery_tag: self.delivery_tag,
            payload: self.payload.clone(),
            redelivered: self.redelivered,
            disposition,
        });
        state.ack_failure.clone().map_or(Ok(()), Err)
    }
}

impl Acknowledger for InMemoryAcker {
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move { self.record(Disposition::Ack) })
    }

    fn nack(
        &self,
        requeue: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move {
            self.record(Disposition::Nack { requeue })?;
            if requeue {
                InMemoryQueue::dispatch(&self.inner, self.payload.clone(), true);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;

    #[tokio::test]
    async fn publish_is_recorded_and_delivered() {
        let queue = InMemoryQueue::new("billing_queue");
        queue
            .publish(&QueueMessage::json(b"{}".to_vec(), Utc::now()))
            .await
            .unwrap();

        assert_eq!(queue.publish_count(), 1);

        let mut stream = queue.consume(1).await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"{}");
        assert!(!delivery.redelivered);
        assert_eq!(queue.prefetch(), Some(1));
    }

    #[tokio::test]
    async fn requeued_message_is_redelivered() {
        let queue = InMemoryQueue::new("billing_queue");
        queue.enqueue(b"payload".to_vec());

        let mut stream = queue.consume(1).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        first.settle(Disposition::Nack { requeue: true }).await.unwrap();

        let second = stream.next().await.unwrap().unwrap();
        assert!(second.redelivered);
        assert_eq!(second.payload, b"payload");
        second.settle(Disposition::Ack).await.unwrap();

        let dispositions: Vec<_> = queue.settlements().iter().map(|s| s.disposition).collect();
        assert_eq!(
            dispositions,
            vec![Disposition::Nack { requeue: true }, Disposition::Ack]
        );
    }

    #[tokio::test]
    async fn publish_failure_is_injected() {
        let queue = InMemoryQueue::new("billing_queue");
        queue.fail_publishes_with(QueueError::Closed("gone".into()));

        let result = queue
            .publish(&QueueMessage::json(b"{}".to_vec(), Utc::now()))
            .await;
        assert!(result.is_err());
        assert_eq!(queue.publish_count(), 0);
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let queue = InMemoryQueue::new("billing_queue");
        let mut stream = queue.consume(1).await.unwrap();
        queue.close().await.unwrap();
        assert!(stream.next().await.is_none());
        assert!(queue.is_closed());
    }
}
