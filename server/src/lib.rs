//! # Billing Queue Server
//!
//! Process wiring for the two deployable services:
//!
//! - **`api-gateway`**: HTTP front door. Validates billing requests and
//!   publishes them to the durable queue.
//! - **`billing-worker`**: drains the queue into `PostgreSQL` and serves the
//!   stored orders over HTTP.
//!
//! Both binaries read a [`Config`] once at startup and shut down through a
//! [`ShutdownCoordinator`](billing_queue_runtime::ShutdownCoordinator) on
//! SIGINT/SIGTERM.

#![forbid(unsafe_code)]

pub mod config;
pub mod lifecycle;

pub use config::{Config, HttpConfig, Timeouts};
pub use lifecycle::{init_tracing, metrics_router, serve_until_shutdown, spawn_http, start_metrics};
