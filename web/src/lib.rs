//! Axum integration for the billing queue pipeline.
//!
//! Two routers live here, one per HTTP-facing process:
//!
//! - [`gateway_router`]: the public API gateway. Accepts `POST /api/billing`
//!   and publishes the body through a
//!   [`BillingProducer`](billing_queue_runtime::BillingProducer).
//! - [`billing_router`]: the billing worker's read side. Serves
//!   `GET /api/orders` from an [`OrderStore`](billing_queue_core::OrderStore).
//!
//! # Request Flow
//!
//! 1. **Correlation ID** is read from `X-Correlation-ID` or generated
//! 2. **Handler** passes the raw body or query to the runtime
//! 3. **Errors** are mapped to status codes by [`AppError`]
//! 4. **Response** carries the correlation ID back to the caller
//!
//! # Example
//!
//! ```ignore
//! use billing_queue_web::{gateway_router, GatewayState};
//!
//! let app = gateway_router(GatewayState::new(producer));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use middleware::{correlation_id_layer, CorrelationId, CORRELATION_ID_HEADER};
pub use router::{billing_router, gateway_router};
pub use state::{BillingState, GatewayState};
