//! HTTP handlers for both services.

pub mod billing;
pub mod health;
pub mod orders;
