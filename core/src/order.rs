//! Billing payloads and persisted orders.
//!
//! A [`BillingRequest`] is the wire payload accepted over HTTP and carried in
//! the queue. An [`Order`] is what the consumer persists: the same three
//! business fields plus a server-generated [`OrderId`].
//!
//! Both trust boundaries (HTTP ingress and queue consumption) parse payloads
//! through [`BillingRequest::parse`], and each boundary runs the check on its
//! own. The queue is never assumed to contain only producer-validated bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Names of the fields every billing payload must carry.
pub const REQUIRED_FIELDS: [&str; 3] = ["user_id", "number_of_items", "total_amount"];

/// Errors produced while parsing a billing payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload is not a JSON object with string fields.
    ///
    /// Retrying can never fix this.
    #[error("invalid JSON: {0}")]
    Malformed(String),

    /// One or more required fields are absent, null, or empty.
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl PayloadError {
    /// Short, stable label for logs and metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "invalid JSON",
            Self::MissingFields(_) => "missing required fields",
        }
    }
}

/// Raw wire shape. Absent and `null` fields decode to `None` so that they are
/// reported as missing rather than as malformed JSON.
#[derive(Debug, Default, Deserialize)]
struct RawBillingPayload {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    number_of_items: Option<String>,
    #[serde(default)]
    total_amount: Option<String>,
}

/// A validated billing request.
///
/// All three fields are guaranteed non-empty. Quantities and amounts stay
/// string-encoded; no cross-field business validation happens here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRequest {
    /// User placing the order.
    pub user_id: String,
    /// String-encoded item count.
    pub number_of_items: String,
    /// String-encoded monetary amount.
    pub total_amount: String,
}

impl BillingRequest {
    /// Parse and validate a raw JSON payload.
    ///
    /// # Errors
    ///
    /// - [`PayloadError::Malformed`] if the bytes are not a JSON object whose
    ///   known fields are strings
    /// - [`PayloadError::MissingFields`] if any required field is absent, null
    ///   or empty
    ///
    /// # Example
    ///
    /// ```
    /// use billing_queue_core::order::{BillingRequest, PayloadError};
    ///
    /// let req = BillingRequest::parse(
    ///     br#"{"user_id":"u1","number_of_items":"3","total_amount":"29.97"}"#,
    /// ).unwrap();
    /// assert_eq!(req.user_id, "u1");
    ///
    /// let err = BillingRequest::parse(br#"{"user_id":""}"#).unwrap_err();
    /// assert!(matches!(err, PayloadError::MissingFields(_)));
    /// ```
    pub fn parse(raw: &[u8]) -> Result<Self, PayloadError> {
        // Decode as an object first: serde would otherwise accept a positional
        // JSON array for a struct.
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(raw).map_err(|e| PayloadError::Malformed(e.to_string()))?;

        let payload: RawBillingPayload = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| PayloadError::Malformed(e.to_string()))?;

        Self::from_raw(payload)
    }

    fn from_raw(payload: RawBillingPayload) -> Result<Self, PayloadError> {
        let fields = [payload.user_id, payload.number_of_items, payload.total_amount];

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .zip(fields.iter())
            .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(PayloadError::MissingFields(missing));
        }

        let [user_id, number_of_items, total_amount] = fields.map(Option::unwrap_or_default);

        Ok(Self {
            user_id,
            number_of_items,
            total_amount,
        })
    }
}

/// Server-generated order identifier.
///
/// Only the consumer creates these; a client can never supply one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID (used when loading from storage).
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A persisted order. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Server-generated identifier.
    pub id: OrderId,
    /// User placing the order.
    pub user_id: String,
    /// String-encoded item count.
    pub number_of_items: String,
    /// String-encoded monetary amount.
    pub total_amount: String,
}

impl Order {
    /// Build an order from a validated request and a freshly generated id.
    #[must_use]
    pub fn new(id: OrderId, request: BillingRequest) -> Self {
        Self {
            id,
            user_id: request.user_id,
            number_of_items: request.number_of_items,
            total_amount: request.total_amount,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_complete_payload() {
        let req = BillingRequest::parse(
            br#"{"user_id":"u1","number_of_items":"3","total_amount":"29.97"}"#,
        )
        .unwrap();

        assert_eq!(req.user_id, "u1");
        assert_eq!(req.number_of_items, "3");
        assert_eq!(req.total_amount, "29.97");
    }

    #[test]
    fn ignores_unknown_fields_including_client_ids() {
        let req = BillingRequest::parse(
            br#"{"id":"client-chosen","user_id":"u1","number_of_items":"3","total_amount":"1"}"#,
        )
        .unwrap();
        assert_eq!(req.user_id, "u1");
    }

    #[test]
    fn rejects_non_json() {
        let err = BillingRequest::parse(b"not json").unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
        assert_eq!(err.reason(), "invalid JSON");
    }

    #[test]
    fn rejects_json_array_as_malformed() {
        let err = BillingRequest::parse(br#"["u1","3","29.97"]"#).unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn rejects_wrong_field_type_as_malformed() {
        let err = BillingRequest::parse(
            br#"{"user_id":"u1","number_of_items":3,"total_amount":"29.97"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn empty_field_is_missing() {
        let err = BillingRequest::parse(
            br#"{"user_id":"","number_of_items":"3","total_amount":"29.97"}"#,
        )
        .unwrap_err();
        assert_eq!(err, PayloadError::MissingFields(vec!["user_id"]));
        assert_eq!(err.to_string(), "missing required fields: user_id");
    }

    #[test]
    fn null_and_absent_fields_are_missing() {
        let err = BillingRequest::parse(br#"{"user_id":null}"#).unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingFields(vec!["user_id", "number_of_items", "total_amount"])
        );
    }

    #[test]
    fn order_takes_fields_from_request() {
        let id = OrderId::new();
        let order = Order::new(
            id,
            BillingRequest {
                user_id: "u1".into(),
                number_of_items: "3".into(),
                total_amount: "29.97".into(),
            },
        );
        assert_eq!(order.id, id);
        assert_eq!(order.user_id, "u1");
    }

    #[test]
    fn order_ids_are_unique() {
        assert_ne!(OrderId::new(), OrderId::new());
    }

    fn field() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            "[a-zA-Z0-9.]{1,12}".prop_map(Some),
        ]
    }

    proptest! {
        #[test]
        fn parse_succeeds_iff_all_fields_present(
            user_id in field(),
            number_of_items in field(),
            total_amount in field(),
        ) {
            let mut object = serde_json::Map::new();
            for (name, value) in REQUIRED_FIELDS.iter().zip([&user_id, &number_of_items, &total_amount]) {
                if let Some(v) = value {
                    object.insert((*name).to_string(), serde_json::Value::String(v.clone()));
                }
            }
            let raw = serde_json::to_vec(&object).unwrap();

            let complete = [&user_id, &number_of_items, &total_amount]
                .iter()
                .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()));

            match BillingRequest::parse(&raw) {
                Ok(req) => {
                    prop_assert!(complete);
                    prop_assert_eq!(Some(req.user_id), user_id);
                }
                Err(PayloadError::MissingFields(missing)) => {
                    prop_assert!(!complete);
                    prop_assert!(!missing.is_empty());
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
