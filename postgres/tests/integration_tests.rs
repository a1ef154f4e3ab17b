//! Integration tests for `PostgresOrderStore` using testcontainers.
//!
//! # Requirements
//!
//! Docker must be running. The tests start a `PostgreSQL` container and are
//! ignored by default:
//!
//! ```text
//! cargo test -p billing-queue-postgres -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use billing_queue_core::order::{BillingRequest, Order, OrderId};
use billing_queue_core::order_store::{OrderStore, OrderStoreError};
use billing_queue_postgres::{PostgresConfig, PostgresOrderStore};
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;

/// Start a Postgres container and return a store with the schema in place.
///
/// Returns both the container (to keep it alive) and the store.
async fn setup_order_store() -> (ContainerAsync<Postgres>, PostgresOrderStore) {
    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start postgres container");

    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get postgres port");

    let config = PostgresConfig {
        host: "127.0.0.1".to_string(),
        port,
        database: "postgres".to_string(),
        ..PostgresConfig::default()
    };

    let mut retries = 0;
    let max_retries = 60;
    loop {
        if let Ok(store) = PostgresOrderStore::connect(&config).await {
            if store.ping().await.is_ok() {
                store.ensure_schema().await.expect("Failed to create schema");
                return (container, store);
            }
        }

        assert!(retries < max_retries, "Failed to connect after {max_retries} retries");
        retries += 1;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

fn order(user_id: &str) -> Order {
    Order::new(
        OrderId::new(),
        BillingRequest {
            user_id: user_id.to_string(),
            number_of_items: "3".to_string(),
            total_amount: "29.97".to_string(),
        },
    )
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_create_then_list() {
    let (_container, store) = setup_order_store().await;

    assert!(store.list_orders().await.unwrap().is_empty());

    let first = order("u1");
    let second = order("u2");
    store.create_order(&first).await.unwrap();
    store.create_order(&second).await.unwrap();

    let orders = store.list_orders().await.unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.contains(&first));
    assert!(orders.contains(&second));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ensure_schema_is_idempotent() {
    let (_container, store) = setup_order_store().await;

    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_id_is_retryable_and_leaves_one_row() {
    let (_container, store) = setup_order_store().await;

    let original = order("u1");
    store.create_order(&original).await.unwrap();

    let err = store.create_order(&original).await.unwrap_err();
    assert!(matches!(err, OrderStoreError::Unavailable(_)));
    assert!(err.is_retryable());

    assert_eq!(store.list_orders().await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_closed_pool_is_unavailable() {
    let (_container, store) = setup_order_store().await;
    store.close().await;

    let err = store.create_order(&order("u1")).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(store.ping().await.is_err());
}
