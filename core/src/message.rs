//! The on-the-wire unit handed to the broker.

use chrono::{DateTime, Utc};

/// Content type attached to every billing message.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message to publish on the billing queue.
///
/// The payload is the exact request body the producer validated, never a
/// re-serialized form. The delivery-attempt count is owned by the broker and
/// is not represented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// MIME content type tag.
    pub content_type: String,
    /// Whether the broker must write the message to stable storage.
    pub persistent: bool,
    /// When the producer created the message.
    pub timestamp: DateTime<Utc>,
}

impl QueueMessage {
    /// Create a persistent JSON message.
    ///
    /// # Example
    ///
    /// ```
    /// use billing_queue_core::message::QueueMessage;
    /// use chrono::Utc;
    ///
    /// let msg = QueueMessage::json(b"{}".to_vec(), Utc::now());
    /// assert!(msg.persistent);
    /// assert_eq!(msg.content_type, "application/json");
    /// ```
    #[must_use]
    pub fn json(payload: Vec<u8>, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload,
            content_type: JSON_CONTENT_TYPE.to_string(),
            persistent: true,
            timestamp,
        }
    }
}
