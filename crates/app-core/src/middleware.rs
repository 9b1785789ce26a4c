//! Request-scoped middleware shared by every portal router.

use std::time::Instant;

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use super::error::AppError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request, echoed back in `x-request-id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestId>().cloned().ok_or(AppError::Internal)
    }
}

pub async fn request_response_logger(mut req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let c_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(c_id.clone()));

    tracing::info!(_cID = c_id, method = %method, path = %path, "Incoming request");

    let mut response = next.run(req).await;

    let duration_ms = start_time.elapsed().as_millis();
    let status = response.status();

    response.headers_mut().insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(&c_id).unwrap_or_else(|_| HeaderValue::from_static("invalid-correlation-id")),
    );

    if status.is_server_error() {
        tracing::error!(_cID = c_id, method = %method, path = %path, status = %status, duration_ms, "Request failed");
    } else if status.is_client_error() {
        tracing::warn!(_cID = c_id, method = %method, path = %path, status = %status, duration_ms, "Request rejected");
    } else {
        tracing::info!(_cID = c_id, method = %method, path = %path, status = %status, duration_ms, "Request completed");
    }

    response
}
