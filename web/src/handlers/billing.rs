//! `POST /api/billing`: accept a billing request and hand it to the queue.

use crate::error::AppError;
use crate::middleware::CorrelationId;
use crate::state::GatewayState;
use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;

/// Body returned once the broker has confirmed the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    /// Human-readable confirmation.
    pub message: &'static str,
    /// Always `"accepted"`.
    pub status: &'static str,
}

impl Ack {
    /// The one success body this endpoint produces.
    #[must_use]
    pub const fn accepted() -> Self {
        Self {
            message: "Message posted successfully",
            status: "accepted",
        }
    }
}

/// Validate the raw body and publish it.
///
/// The body is read as bytes rather than through `Json<_>` so that the
/// producer owns validation and the error wording stays the same for every
/// kind of bad input.
///
/// # Errors
///
/// - 400 when the body is not a JSON object or a required field is empty
/// - 500 when the broker does not confirm the publish
pub async fn submit_billing(
    State(state): State<GatewayState>,
    correlation_id: CorrelationId,
    body: Bytes,
) -> Result<Json<Ack>, AppError> {
    let accepted = state.producer.submit(&body).await?;

    tracing::debug!(
        correlation_id = %correlation_id,
        queue = %accepted.queue,
        published_at = %accepted.published_at,
        "Billing request accepted"
    );

    Ok(Json(Ack::accepted()))
}
