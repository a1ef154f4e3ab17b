//! # Billing Queue Testing
//!
//! Test doubles for the billing queue pipeline.
//!
//! This crate provides:
//! - [`InMemoryQueue`]: a [`MessageQueue`](billing_queue_core::MessageQueue) spy that
//!   records publishes and settlements and redelivers requeued messages
//! - [`MockOrderStore`]: an [`OrderStore`](billing_queue_core::OrderStore) with
//!   scriptable failures
//! - [`mocks::FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use billing_queue_testing::{InMemoryQueue, MockOrderStore};
//!
//! #[tokio::test]
//! async fn test_consume() {
//!     let queue = InMemoryQueue::new("billing_queue");
//!     let store = MockOrderStore::new();
//!
//!     queue.enqueue(br#"{"user_id":"u1","number_of_items":"3","total_amount":"1"}"#.to_vec());
//!     // ... run the consumer ...
//!     assert_eq!(store.orders().len(), 1);
//! }
//! ```

pub mod order_store;
pub mod queue;

pub use order_store::MockOrderStore;
pub use queue::{InMemoryQueue, Settlement};

/// Mock implementations of environment traits.
pub mod mocks {
    use billing_queue_core::environment::Clock;
    use chrono::{DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use billing_queue_testing::mocks::FixedClock;
    /// use billing_queue_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a test-friendly tracing subscriber.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billing_queue=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
