//! HTTP handlers.
//!
//! Every error leaves as `{"error": "..."}` with a matching status code.

mod health;
mod offers;
mod sellers;
mod tasks;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use offers_core::OffersError;
use offers_ingest::{GatewayError, SubmitError};

pub use health::health;
pub use offers::offers_load;
pub use sellers::{sellers_create, sellers_get, sellers_list};
pub use tasks::{tasks_get, tasks_list};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::PayloadTooLarge(m)
            | ApiError::Unavailable(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::UnknownSeller(_) | GatewayError::DuplicateSeller(_) => {
                ApiError::BadRequest(e.to_string())
            }
            GatewayError::TaskNotFound(_) => ApiError::NotFound(e.to_string()),
            other => {
                error!("storage failure: {}", other);
                ApiError::Internal("storage unavailable".to_string())
            }
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::UnknownSeller(_) => ApiError::BadRequest(e.to_string()),
            SubmitError::DispatcherClosed(_) => ApiError::Unavailable(e.to_string()),
            SubmitError::Gateway(inner) => inner.into(),
        }
    }
}

impl From<OffersError> for ApiError {
    fn from(e: OffersError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("not found".to_string())
}
