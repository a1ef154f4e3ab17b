//! # Billing Queue Runtime
//!
//! The moving parts of the billing pipeline, independent of any particular
//! broker or database:
//!
//! - [`retry`]: bounded retry with backoff, used for broker connections
//! - [`producer::BillingProducer`]: validate and publish a billing request
//! - [`consumer::OrderConsumer`]: drain the queue into an order store
//! - [`shutdown`]: signal handling and ordered component shutdown
//! - [`metrics`]: counters for both paths and the Prometheus recorder
//!
//! Everything here talks to the outside world through the
//! [`MessageQueue`](billing_queue_core::MessageQueue) and
//! [`OrderStore`](billing_queue_core::OrderStore) traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod metrics;
pub mod producer;
pub mod retry;
pub mod shutdown;

pub use consumer::{ConsumerError, OrderConsumer};
pub use producer::{Accepted, BillingProducer, SubmitError};
pub use retry::{retry_with_backoff, Backoff, RetryPolicy};
pub use shutdown::{wait_for_signal, ShutdownCoordinator, ShutdownHandler};
