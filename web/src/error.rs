//! Error types for web handlers.
//!
//! [`AppError`] bridges the pipeline's error enums and HTTP responses. Every
//! error renders as a JSON body `{"code": "...", "message": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use billing_queue_core::order_store::OrderStoreError;
use billing_queue_runtime::producer::SubmitError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<GatewayState>, body: Bytes) -> Result<Json<Ack>, AppError> {
///     state.producer.submit(&body).await?;
///     Ok(Json(Ack::accepted()))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying error for server-side logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// Create a 504 Gateway Timeout error.
    #[must_use]
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT", message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::RejectedInput(payload) => Self::bad_request(payload.reason()),
            SubmitError::PublishFailed(queue) => {
                Self::internal("failed to publish message").with_source(anyhow::Error::new(queue))
            }
        }
    }
}

impl From<OrderStoreError> for AppError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::Timeout(_) => Self::gateway_timeout("order store timed out"),
            other => Self::internal("failed to load orders").with_source(anyhow::Error::new(other)),
        }
    }
}
