//! `GET /api/orders`: list everything the consumer has stored.

use crate::error::AppError;
use crate::state::BillingState;
use axum::{extract::State, Json};
use billing_queue_core::order::Order;
use billing_queue_core::order_store::OrderStoreError;

/// Return all orders as a JSON array.
///
/// # Errors
///
/// - 504 when the store does not answer within the configured timeout
/// - 500 for any other store failure
pub async fn list_orders(State(state): State<BillingState>) -> Result<Json<Vec<Order>>, AppError> {
    let orders = tokio::time::timeout(state.list_timeout, state.store.list_orders())
        .await
        .map_err(|_| OrderStoreError::Timeout(state.list_timeout))??;

    Ok(Json(orders))
}
