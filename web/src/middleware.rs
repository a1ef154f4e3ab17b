//! Correlation ID middleware.
//!
//! 1. **Extract** the correlation ID from the `X-Correlation-ID` header, or generate a UUID
//! 2. **Store** it in request extensions as [`CorrelationId`]
//! 3. **Run** the request inside a tracing span carrying `correlation_id`
//! 4. **Echo** it back in the response `X-Correlation-ID` header
//!
//! Incoming IDs are accepted as long as they are short, visible ASCII, so
//! callers can propagate whatever ID scheme their own tracing uses.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderValue},
    response::Response,
};
use std::fmt;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

const MAX_CORRELATION_ID_LEN: usize = 128;

/// Correlation ID of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .filter(|s| is_acceptable(s))
            .map_or_else(|| Self(Uuid::new_v4().to_string()), |s| Self(s.to_string()))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CORRELATION_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic())
}

/// Reads the ID stored by [`correlation_id_layer`]; generates one if the layer is absent.
#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self::from_header(parts.headers.get(CORRELATION_ID_HEADER))))
    }
}

/// Create a layer that adds correlation ID tracking to all requests.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Copy, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = CorrelationId::from_header(req.headers().get(CORRELATION_ID_HEADER));
        let header_value = HeaderValue::from_str(&correlation_id.0).ok();

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        req.extensions_mut().insert(correlation_id);
        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Some(value) = header_value {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }

            Ok(response)
        })
    }
}
