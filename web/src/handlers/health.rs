//! Liveness endpoints.
//!
//! Both answer 200 with a fixed plain-text body as long as the process can
//! serve HTTP; neither checks the broker or the database.

/// `GET /api/health` on the API gateway.
pub async fn gateway_health() -> &'static str {
    "API Gateway is healthy"
}

/// `GET /api/health` on the billing service.
pub async fn billing_health() -> &'static str {
    "Billing service is healthy"
}
