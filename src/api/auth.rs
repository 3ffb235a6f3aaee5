//! Shared-secret gate for the management routes.
//!
//! When an API key is configured every gated request must carry it verbatim
//! in the `x-api-key` header. Without a configured key the gate is open.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use secrecy::{ExposeSecret, SecretString};

use super::error::ApiError;
use super::AppState;

/// Header carrying the management API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Whether `headers` satisfy the configured key.
pub fn is_authorized(headers: &HeaderMap, expected: Option<&SecretString>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|provided| constant_time_eq(provided.as_bytes(), expected.expose_secret().as_bytes()))
}

/// Compares equal-length inputs in constant time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_authorized(request.headers(), state.api_key.as_deref()) {
        tracing::warn!(path = %request.uri().path(), "Rejected request without valid API key");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}
