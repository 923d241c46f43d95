use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use offers_ingest::PersistenceGateway;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_ingestions: u64,
}

pub async fn health<G: PersistenceGateway>(
    State(state): State<Arc<AppState<G>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_ingestions: state.lifecycle.active_workers(),
    })
}
