//! Request-context middleware.
//!
//! Every request gets:
//! - a request id (from `X-Request-Id`, or a new UUID), stored in the request
//!   extensions as [`RequestId`] and echoed on the response
//! - a tracing span carrying the id, method and path
//! - a completion log line with status and latency
//! - an `stockroom_http_requests_total{method,status}` counter increment
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/health", get(health_check))
//!     .layer(request_context_layer());
//! ```

use crate::extractors::RequestId;
use axum::{extract::Request, http::HeaderValue, response::Response};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for the request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Counter name for completed HTTP requests.
pub const HTTP_REQUESTS_TOTAL: &str = "stockroom_http_requests_total";

/// Create the request-context layer.
#[must_use]
pub const fn request_context_layer() -> RequestContextLayer {
    RequestContextLayer
}

/// Layer installing [`RequestContext`].
#[derive(Clone, Debug)]
pub struct RequestContextLayer;

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContext<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContext { inner }
    }
}

/// Middleware service; see the module docs.
#[derive(Clone, Debug)]
pub struct RequestContext<S> {
    inner: S,
}

impl<S> Service<Request> for RequestContext<S>
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
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty() && s.len() <= 128)
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        req.extensions_mut().insert(RequestId(request_id.clone()));

        let method = req.method().clone();
        let span = tracing::info_span!(
            "http_request",
            request_id = %request_id,
            method = %method,
            path = %req.uri().path(),
        );

        let started = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let mut response = fut.await?;
                let status = response.status();

                tracing::info!(
                    status = status.as_u16(),
                    latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Request completed"
                );
                metrics::counter!(
                    HTTP_REQUESTS_TOTAL,
                    "method" => method.to_string(),
                    "status" => status.as_u16().to_string()
                )
                .increment(1);

                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}
