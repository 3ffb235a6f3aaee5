use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::discord::DiscordError;
use crate::feed::FetchError;
use crate::relay::CheckError;
use crate::storage::{DatabaseError, MIN_INTERVAL_MS};
use crate::util::UrlValidationError;

/// Request input rejected before touching the store.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {source}")]
    Url {
        field: &'static str,
        #[source]
        source: UrlValidationError,
    },
    #[error("Invalid {0}: expected a Discord id (16-21 digits)")]
    DiscordId(&'static str),
    #[error("intervalMs must be at least {min}, got {0}", min = MIN_INTERVAL_MS)]
    IntervalTooShort(i64),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("Nothing to update")]
    NoChanges,
    #[error("Malformed request body: {0}")]
    Body(String),
}

/// Every failure a handler can return, mapped to a status code and a
/// `{"error": "..."}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Missing or invalid API key")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] DatabaseError),
    #[error("Feed could not be loaded: {0}")]
    Feed(#[from] FetchError),
    #[error("Discord request failed: {0}")]
    Discord(#[from] DiscordError),
}

impl From<CheckError> for ApiError {
    fn from(err: CheckError) -> Self {
        match err {
            CheckError::Fetch(e) => ApiError::Feed(e),
            CheckError::Delivery(e) => ApiError::Discord(e),
            CheckError::Storage(e) => ApiError::Store(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Store(e) => match e {
                DatabaseError::NotFound => StatusCode::NOT_FOUND,
                DatabaseError::Duplicate => StatusCode::CONFLICT,
                DatabaseError::Ambiguous(_) | DatabaseError::Validation(_) => {
                    StatusCode::BAD_REQUEST
                }
                DatabaseError::Migration(_) | DatabaseError::Other(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Feed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Discord(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
