//! Custom Axum extractors.
//!
//! - [`RequestDeadline`]: the caller's deadline from `Request-Timeout-Ms`,
//!   capped by the server's [`DeadlinePolicy`]
//! - [`RequestId`]: the id assigned by the request-context middleware
//!
//! # Examples
//!
//! ```ignore
//! async fn reserve(
//!     State(state): State<AppState>,
//!     RequestDeadline(deadline): RequestDeadline,
//!     Json(body): Json<StockRequest>,
//! ) -> Result<Json<Message>, AppError> {
//!     state.engine.reserve(body.product_id, body.quantity, deadline).await?;
//!     Ok(Json(Message::reserved()))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::REQUEST_ID_HEADER;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::time::Duration;
use stockroom_core::Deadline;
use uuid::Uuid;

/// Header carrying the caller's timeout in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "Request-Timeout-Ms";

/// Upper bound on how long any HTTP caller may ask the server to wait.
///
/// Taken from router state via [`FromRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlinePolicy {
    /// Longest deadline granted; also the deadline when the header is absent.
    pub max: Duration,
}

impl DeadlinePolicy {
    /// Create a policy with the given cap.
    #[must_use]
    pub const fn new(max: Duration) -> Self {
        Self { max }
    }

    /// Resolve the effective timeout from an optional header value.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`AppError`] when the value is not a positive integer.
    pub fn resolve(&self, header: Option<&str>) -> Result<Duration, AppError> {
        let Some(raw) = header else {
            return Ok(self.max);
        };

        match raw.trim().parse::<u64>() {
            Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis).min(self.max)),
            _ => Err(AppError::bad_request(format!(
                "{REQUEST_TIMEOUT_HEADER} must be a positive integer, got '{raw}'"
            ))),
        }
    }
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Deadline for the current request.
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline(pub Deadline);

#[async_trait]
impl<S> FromRequestParts<S> for RequestDeadline
where
    DeadlinePolicy: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = DeadlinePolicy::from_ref(state);
        let header = match parts.headers.get(REQUEST_TIMEOUT_HEADER) {
            Some(value) => Some(value.to_str().map_err(|_| {
                AppError::bad_request(format!("{REQUEST_TIMEOUT_HEADER} must be ASCII"))
            })?),
            None => None,
        };

        let timeout = policy.resolve(header)?;
        Ok(Self(Deadline::after(timeout)))
    }
}

/// Request id for log correlation.
///
/// Reads the id stored by the request-context middleware, falling back to the
/// `X-Request-Id` header, or a fresh UUID v4 when neither is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(id.clone());
        }

        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        Ok(Self(id))
    }
}
