//! Order store trait consumed by the queue consumer.
//!
//! The store is deliberately narrow: the consumer only ever creates orders.
//! Listing exists for the billing service's read endpoint.
//!
//! # Implementations
//!
//! - `PostgresOrderStore` (in `billing-queue-postgres`): production
//! - `MockOrderStore` (in `billing-queue-testing`): scriptable test double

use crate::order::Order;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during order store operations.
///
/// The consumer's requeue-versus-discard decision depends on
/// [`OrderStoreError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderStoreError {
    /// The store rejected the record itself (constraint or data error).
    ///
    /// Retrying the same input cannot succeed.
    #[error("Order rejected by store: {0}")]
    Rejected(String),

    /// The store is unreachable or failed mid-transaction.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish within its deadline.
    #[error("Order store operation timed out after {0:?}")]
    Timeout(Duration),
}

impl OrderStoreError {
    /// Whether a later attempt with the same input may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Trait for order store implementations.
///
/// `create_order` must be atomic: afterwards the order is either fully
/// visible or not stored at all.
pub trait OrderStore: Send + Sync {
    /// Insert one order.
    ///
    /// # Errors
    ///
    /// - [`OrderStoreError::Rejected`] if the record violates a constraint
    /// - [`OrderStoreError::Unavailable`] on connection or transaction failure
    fn create_order(
        &self,
        order: &Order,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Load every stored order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::Unavailable`] if the query fails.
    fn list_orders(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Order>, OrderStoreError>> + Send + '_>>;
}
