//! `PostgreSQL` order store for the billing pipeline.
//!
//! This crate provides [`PostgresOrderStore`], the production implementation
//! of the [`OrderStore`] trait from `billing-queue-core`, on top of a sqlx
//! connection pool:
//!
//! - Transactional single-row insert (begin, insert, commit; rollback on drop)
//! - Listing of all stored orders
//! - Schema bootstrap and a startup ping
//!
//! # Example
//!
//! ```ignore
//! use billing_queue_postgres::{PostgresConfig, PostgresOrderStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresOrderStore::connect(&PostgresConfig::default()).await?;
//!     store.ensure_schema().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;

pub use config::PostgresConfig;
pub use error::classify;

use billing_queue_core::order::{Order, OrderId};
use billing_queue_core::order_store::{OrderStore, OrderStoreError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use uuid::Uuid;

const CREATE_ORDERS_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        number_of_items TEXT NOT NULL,
        total_amount TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
";

/// `PostgreSQL`-based order store.
///
/// Cloning shares the underlying pool.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Open a connection pool using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::Unavailable`] if no connection can be
    /// established within the configured connect timeout.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, OrderStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| OrderStoreError::Unavailable(format!("Failed to connect to database: {e}")))?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            "Connected to order database"
        );

        Ok(Self { pool })
    }

    /// Create a store from an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `orders` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::Unavailable`] if the statement fails.
    pub async fn ensure_schema(&self) -> Result<(), OrderStoreError> {
        sqlx::query(CREATE_ORDERS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| OrderStoreError::Unavailable(format!("Failed to create orders table: {e}")))?;

        tracing::debug!("Orders table ready");
        Ok(())
    }

    /// Verify the database answers a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::Unavailable`] if the query fails.
    pub async fn ping(&self) -> Result<(), OrderStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| OrderStoreError::Unavailable(format!("Database ping failed: {e}")))
    }

    /// Close every connection in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Order database pool closed");
    }

    async fn insert(&self, order: &Order) -> Result<(), OrderStoreError> {
        let start = Instant::now();

        // Dropping the transaction before commit rolls it back.
        let mut tx = self.pool.begin().await.map_err(classify)?;

        sqlx::query(
            r"
            INSERT INTO orders (id, user_id, number_of_items, total_amount)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(order.id.as_uuid())
        .bind(&order.user_id)
        .bind(&order.number_of_items)
        .bind(&order.total_amount)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        tracing::debug!(
            order_id = %order.id,
            duration_ms = start.elapsed().as_millis(),
            "Order inserted"
        );
        metrics::counter!("billing.store.orders_created").increment(1);

        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        let rows: Vec<(Uuid, String, String, String)> = sqlx::query_as(
            r"
            SELECT id, user_id, number_of_items, total_amount
            FROM orders
            ORDER BY created_at, id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrderStoreError::Unavailable(format!("Failed to list orders: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, number_of_items, total_amount)| Order {
                id: OrderId::from_uuid(id),
                user_id,
                number_of_items,
                total_amount,
            })
            .collect())
    }
}

impl OrderStore for PostgresOrderStore {
    fn create_order(
        &self,
        order: &Order,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
        let order = order.clone();
        Box::pin(async move { self.insert(&order).await })
    }

    fn list_orders(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Order>, OrderStoreError>> + Send + '_>> {
        Box::pin(self.fetch_all())
    }
}

impl std::fmt::Debug for PostgresOrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresOrderStore")
            .field("pool_size", &self.pool.size())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}
