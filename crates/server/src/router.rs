//! HTTP router construction.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use offers_ingest::PersistenceGateway;

use crate::api;
use crate::state::AppState;

/// Build the application router with all routes and middleware.
pub fn build_router<G: PersistenceGateway>(state: Arc<AppState<G>>) -> Router {
    let body_limit = state.config.ingest.max_upload_bytes();
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/health", get(api::health::<G>))
        .route(
            "/sellers",
            get(api::sellers_list::<G>).post(api::sellers_create::<G>),
        )
        .route("/sellers/{seller_id}", get(api::sellers_get::<G>))
        .route("/sellers/{seller_id}/offers/load", post(api::offers_load::<G>))
        .route("/tasks", get(api::tasks_list::<G>))
        .route("/tasks/{task_id}", get(api::tasks_get::<G>))
        .fallback(api::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(value))
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!("Invalid CORS_ORIGIN '{}', cross-origin requests disabled", origin);
            CorsLayer::new()
        }
    }
}
