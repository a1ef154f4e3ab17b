//! End-to-end pipeline test: gateway router → RabbitMQ → consumer → PostgreSQL.
//!
//! Needs Docker:
//!
//! ```text
//! cargo test -p billing-queue-server -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use billing_queue_amqp::{AmqpConfig, AmqpQueue};
use billing_queue_core::environment::SystemClock;
use billing_queue_core::order_store::OrderStore;
use billing_queue_postgres::{PostgresConfig, PostgresOrderStore};
use billing_queue_runtime::retry::{Backoff, RetryPolicy};
use billing_queue_runtime::{BillingProducer, OrderConsumer};
use billing_queue_web::{gateway_router, GatewayState};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::{postgres::Postgres, rabbitmq::RabbitMq};
use tokio::sync::broadcast;
use tower::ServiceExt;

fn patient_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(60)
        .backoff(Backoff::linear(Duration::from_millis(500)))
        .build()
}

async fn connect_store(config: &PostgresConfig) -> PostgresOrderStore {
    for _ in 0..60 {
        if let Ok(store) = PostgresOrderStore::connect(config).await {
            if store.ping().await.is_ok() {
                store.ensure_schema().await.unwrap();
                return store;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("database never became ready");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn accepted_request_becomes_an_order() {
    let rabbit = RabbitMq::default().start().await.unwrap();
    let postgres = Postgres::default().start().await.unwrap();

    let amqp = AmqpConfig {
        host: "127.0.0.1".into(),
        port: rabbit.get_host_port_ipv4(5672).await.unwrap(),
        ..AmqpConfig::default()
    };
    let pg = PostgresConfig {
        host: "127.0.0.1".into(),
        port: postgres.get_host_port_ipv4(5432).await.unwrap(),
        database: "postgres".into(),
        ..PostgresConfig::default()
    };

    let store = connect_store(&pg).await;
    let gateway_queue = Arc::new(AmqpQueue::connect(&amqp, &patient_policy()).await.unwrap());
    let worker_queue = Arc::new(AmqpQueue::connect(&amqp, &patient_policy()).await.unwrap());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = OrderConsumer::new(worker_queue, Arc::new(store.clone()), shutdown_rx).spawn();

    let app = gateway_router(GatewayState::new(BillingProducer::new(
        gateway_queue,
        Arc::new(SystemClock),
    )));

    let bad = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/billing")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"user_id":"u1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let good = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/billing")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"user_id":"u1","number_of_items":"3","total_amount":"29.97"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(good.status(), StatusCode::OK);

    let mut orders = Vec::new();
    for _ in 0..50 {
        orders = store.list_orders().await.unwrap();
        if !orders.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].user_id, "u1");
    assert_eq!(orders[0].number_of_items, "3");
    assert_eq!(orders[0].total_amount, "29.97");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), consumer)
        .await
        .expect("consumer should stop on shutdown")
        .unwrap();
}
