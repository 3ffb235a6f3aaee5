//! Management HTTP API.
//!
//! JSON over axum, every route under `/api`:
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/api/health` | liveness, never gated |
//! | POST | `/api/feeds` | add a subscription |
//! | GET | `/api/feeds` | list, optionally `?channelId=` |
//! | PATCH | `/api/feeds` | change interval, channel or URL |
//! | POST | `/api/feeds/toggle` | pause / resume |
//! | DELETE | `/api/feeds` | remove |
//! | POST | `/api/test-parse` | dry-run parse of any feed |
//! | POST | `/api/send-latest` | run one check now |
//! | POST | `/api/manual` | post an arbitrary article |
//!
//! Errors are `{"error": "..."}` with the status from [`ApiError::status`].

mod auth;
mod error;
mod handlers;

use axum::routing::{get, post};
use axum::{middleware, Router};
use secrecy::SecretString;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::relay::Relay;

pub use auth::{is_authorized, API_KEY_HEADER};
pub use error::{ApiError, ValidationError};
pub use handlers::ParseReport;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// When set, gated routes require this value in `x-api-key`
    pub api_key: Option<Arc<SecretString>>,
    /// Interval applied when an add request omits `intervalMs`
    pub default_interval_ms: i64,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("relay", &self.relay)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("default_interval_ms", &self.default_interval_ms)
            .finish()
    }
}

/// Builds the application router.
///
/// Separate from [`serve`] so tests can drive it without a socket.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route(
            "/feeds",
            post(handlers::add_feed)
                .get(handlers::list_feeds)
                .patch(handlers::update_feed)
                .delete(handlers::delete_feed),
        )
        .route("/feeds/toggle", post(handlers::toggle_feed))
        .route("/test-parse", post(handlers::test_parse))
        .route("/send-latest", post(handlers::send_latest))
        .route("/manual", post(handlers::manual_post))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .merge(gated);

    Router::new().nest("/api", api).with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, gated = state.api_key.is_some(), "Management API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
