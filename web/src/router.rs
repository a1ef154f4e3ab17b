//! Route tables for the two HTTP services.

use crate::handlers::{billing, health, orders};
use crate::middleware::correlation_id_layer;
use crate::state::{BillingState, GatewayState};
use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const CONFIRM_DELETE: HeaderName = HeaderName::from_static("confirm-delete");

/// CORS policy of the public gateway: any origin, the usual verbs.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, CONFIRM_DELETE])
}

/// Routes of the API gateway.
///
/// - `GET /api/health`
/// - `POST /api/billing`
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/health", get(health::gateway_health))
        .route("/api/billing", post(billing::submit_billing))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}

/// Routes of the billing service.
///
/// - `GET /api/health`
/// - `GET /api/orders`
pub fn billing_router(state: BillingState) -> Router {
    Router::new()
        .route("/api/health", get(health::billing_health))
        .route("/api/orders", get(orders::list_orders))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::CORRELATION_ID_HEADER;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use billing_queue_core::environment::Clock;
    use billing_queue_core::order::{BillingRequest, Order, OrderId};
    use billing_queue_core::order_store::OrderStore;
    use billing_queue_core::queue::QueueError;
    use billing_queue_runtime::producer::BillingProducer;
    use billing_queue_testing::mocks::test_clock;
    use billing_queue_testing::{InMemoryQueue, MockOrderStore};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const VALID: &str = r#"{"user_id":"u1","number_of_items":"3","total_amount":"29.97"}"#;

    fn gateway(queue: &InMemoryQueue) -> Router {
        let producer = BillingProducer::new(Arc::new(queue.clone()), Arc::new(test_clock()));
        gateway_router(GatewayState::new(producer))
    }

    fn post_billing(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/billing")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_gateway_health() {
        let response = gateway(&InMemoryQueue::new("billing_queue"))
            .oneshot(get("/api/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
        assert_eq!(body_bytes(response).await, b"API Gateway is healthy");
    }

    #[tokio::test]
    async fn test_submit_valid_publishes_once() {
        let queue = InMemoryQueue::new("billing_queue");
        let response = gateway(&queue).oneshot(post_billing(VALID)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"message": "Message posted successfully", "status": "accepted"})
        );

        let published = queue.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload, VALID.as_bytes());
        assert_eq!(published[0].timestamp, test_clock().now());
    }

    #[tokio::test]
    async fn test_submit_malformed_is_400_without_publish() {
        let queue = InMemoryQueue::new("billing_queue");
        let response = gateway(&queue).oneshot(post_billing("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "invalid JSON");
        assert_eq!(queue.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_empty_field_is_400_without_publish() {
        let queue = InMemoryQueue::new("billing_queue");
        let body = r#"{"user_id":"","number_of_items":"3","total_amount":"29.97"}"#;
        let response = gateway(&queue).oneshot(post_billing(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "missing required fields");
        assert_eq!(queue.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_publish_failure_is_500() {
        let queue = InMemoryQueue::new("billing_queue");
        queue.fail_publishes_with(QueueError::PublishFailed {
            queue: "billing_queue".into(),
            reason: "broker nacked".into(),
        });

        let response = gateway(&queue).oneshot(post_billing(VALID)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
        assert_eq!(body["message"], "failed to publish message");
    }

    #[tokio::test]
    async fn test_billing_rejects_get() {
        let response = gateway(&InMemoryQueue::new("billing_queue"))
            .oneshot(get("/api/billing"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/billing")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = gateway(&InMemoryQueue::new("billing_queue"))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("POST"));
        assert!(methods.contains("DELETE"));
    }

    fn stored_order() -> Order {
        Order::new(
            OrderId::new(),
            BillingRequest {
                user_id: "u1".into(),
                number_of_items: "3".into(),
                total_amount: "29.97".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_billing_health() {
        let app = billing_router(BillingState::new(Arc::new(MockOrderStore::new())));
        let response = app.oneshot(get("/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"Billing service is healthy");
    }

    #[tokio::test]
    async fn test_list_orders() {
        let store = MockOrderStore::new();
        let order = stored_order();
        store.create_order(&order).await.unwrap();

        let app = billing_router(BillingState::new(Arc::new(store)));
        let response = app.oneshot(get("/api/orders")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let orders: Vec<Order> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(orders, vec![order]);
    }

    #[tokio::test]
    async fn test_list_orders_empty_is_empty_array() {
        let app = billing_router(BillingState::new(Arc::new(MockOrderStore::new())));
        let response = app.oneshot(get("/api/orders")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_orders_timeout_is_504() {
        let store = MockOrderStore::new();
        store.delay_lists(Duration::from_secs(60));

        let state = BillingState::new(Arc::new(store)).with_list_timeout(Duration::from_secs(5));
        let response = billing_router(state).oneshot(get("/api/orders")).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
