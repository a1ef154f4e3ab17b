//! Acknowledgement decisions for consumed messages.
//!
//! The consumer walks each delivery through
//! `Received → Decoding → Validating → Persisting → Acknowledging`. Every exit
//! from that walk is captured as an [`Outcome`], and [`decide`] maps the
//! outcome to a [`Disposition`] without touching the broker. The I/O that
//! carries the disposition out lives in the runtime crate.
//!
//! | Outcome                         | Disposition              |
//! |---------------------------------|--------------------------|
//! | payload is not valid JSON       | `Nack { requeue: false }` |
//! | required field missing/empty    | `Nack { requeue: false }` |
//! | store failed, retryable         | `Nack { requeue: true }`  |
//! | store rejected the record       | `Nack { requeue: false }` |
//! | order stored                    | `Ack`                     |

use crate::order::{BillingRequest, OrderId, PayloadError};
use crate::order_store::OrderStoreError;

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished; remove the message from the queue.
    Ack,
    /// Processing did not finish.
    Nack {
        /// Return the message to the queue for another delivery.
        requeue: bool,
    },
}

impl Disposition {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nack { requeue: true } => "requeue",
            Self::Nack { requeue: false } => "discard",
        }
    }
}

/// Terminal result of processing one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The payload failed decoding or validation.
    Rejected(PayloadError),
    /// The order was committed to the store.
    Stored(OrderId),
    /// The store call failed.
    StoreFailed(OrderStoreError),
}

/// Decode and validate a delivered payload.
///
/// Runs the same field check as the producer.
///
/// # Errors
///
/// Returns the [`PayloadError`] that makes the message permanently unprocessable.
pub fn decode(payload: &[u8]) -> Result<BillingRequest, PayloadError> {
    BillingRequest::parse(payload)
}

/// Map a processing outcome to the acknowledgement to send.
///
/// # Example
///
/// ```
/// use billing_queue_core::disposition::{decide, Disposition, Outcome};
/// use billing_queue_core::order::PayloadError;
///
/// let outcome = Outcome::Rejected(PayloadError::Malformed("eof".into()));
/// assert_eq!(decide(&outcome), Disposition::Nack { requeue: false });
/// ```
#[must_use]
pub const fn decide(outcome: &Outcome) -> Disposition {
    match outcome {
        Outcome::Rejected(_) => Disposition::Nack { requeue: false },
        Outcome::Stored(_) => Disposition::Ack,
        Outcome::StoreFailed(err) => Disposition::Nack {
            requeue: err.is_retryable(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn malformed_payload_is_discarded() {
        let outcome = Outcome::Rejected(PayloadError::Malformed("expected value".into()));
        assert_eq!(decide(&outcome), Disposition::Nack { requeue: false });
    }

    #[test]
    fn missing_fields_are_discarded() {
        let outcome = Outcome::Rejected(PayloadError::MissingFields(vec!["total_amount"]));
        assert_eq!(decide(&outcome), Disposition::Nack { requeue: false });
    }

    #[test]
    fn transient_store_failures_are_requeued() {
        for err in [
            OrderStoreError::Unavailable("connection refused".into()),
            OrderStoreError::Timeout(Duration::from_secs(10)),
        ] {
            assert_eq!(
                decide(&Outcome::StoreFailed(err)),
                Disposition::Nack { requeue: true }
            );
        }
    }

    #[test]
    fn store_rejection_is_discarded() {
        let outcome = Outcome::StoreFailed(OrderStoreError::Rejected("check violation".into()));
        assert_eq!(decide(&outcome), Disposition::Nack { requeue: false });
    }

    #[test]
    fn stored_order_is_acked() {
        assert_eq!(decide(&Outcome::Stored(OrderId::new())), Disposition::Ack);
    }

    #[test]
    fn decode_matches_producer_validation() {
        assert!(decode(br#"{"user_id":"u1","number_of_items":"3","total_amount":"29.97"}"#).is_ok());
        assert!(matches!(decode(b"{"), Err(PayloadError::Malformed(_))));
        assert!(matches!(
            decode(br#"{"user_id":"u1","number_of_items":"","total_amount":"1"}"#),
            Err(PayloadError::MissingFields(_))
        ));
    }

    #[test]
    fn labels() {
        assert_eq!(Disposition::Ack.as_str(), "ack");
        assert_eq!(Disposition::Nack { requeue: true }.as_str(), "requeue");
        assert_eq!(Disposition::Nack { requeue: false }.as_str(), "discard");
    }
}
