//! # Billing Queue Core
//!
//! Core types and traits for the billing queue pipeline.
//!
//! The pipeline accepts billing requests over HTTP, hands them to a durable
//! message queue, and later drains that queue into an order store:
//!
//! ```text
//! HTTP ──► Producer ──► durable queue ──► Consumer ──► OrderStore
//!          (validate,     (broker owns     (decode, validate,
//!           publish)       the message)     persist, ack/nack)
//! ```
//!
//! This crate holds everything that does not perform I/O:
//!
//! - **Domain types**: [`order::BillingRequest`], [`order::Order`], [`order::OrderId`]
//! - **Wire unit**: [`message::QueueMessage`]
//! - **Seams**: [`queue::MessageQueue`] and [`order_store::OrderStore`] traits,
//!   implemented by the `amqp` and `postgres` crates and by in-memory test doubles
//! - **Decision logic**: [`disposition::decide`], the pure mapping from a
//!   processing outcome to an acknowledgement
//!
//! ## Delivery Semantics
//!
//! - **At-least-once**: a message is removed from the queue only on a positive ack
//! - **No deduplication**: a redelivered message after a partial success can
//!   produce a second order
//! - **Serialized consumption**: one unacknowledged message per consumer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod disposition;
pub mod message;
pub mod order;
pub mod order_store;
pub mod queue;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use disposition::{decide, Disposition, Outcome};
pub use message::QueueMessage;
pub use order::{BillingRequest, Order, OrderId, PayloadError};
pub use order_store::{OrderStore, OrderStoreError};
pub use queue::{Acknowledger, Delivery, DeliveryStream, MessageQueue, QueueError};

/// Environment module - injected dependencies abstracted behind traits.
///
/// Producer and consumer receive these through their constructors so tests
/// can substitute deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use billing_queue_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
