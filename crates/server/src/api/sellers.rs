//! Seller registration and lookup.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use offers_core::{Seller, SellerId};
use offers_ingest::PersistenceGateway;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSeller {
    pub seller_name: String,
}

/// POST /sellers
pub async fn sellers_create<G: PersistenceGateway>(
    State(state): State<Arc<AppState<G>>>,
    body: Result<Json<CreateSeller>, JsonRejection>,
) -> Result<(StatusCode, Json<Seller>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Seller::validate_name(&body.seller_name)?;

    let seller = state
        .lifecycle
        .gateway()
        .create_seller(&body.seller_name)
        .await?;
    info!(seller_id = seller.seller_id, "seller registered");
    Ok((StatusCode::CREATED, Json(seller)))
}

/// GET /sellers/{seller_id}
pub async fn sellers_get<G: PersistenceGateway>(
    State(state): State<Arc<AppState<G>>>,
    seller_id: Result<Path<SellerId>, PathRejection>,
) -> Result<Json<Seller>, ApiError> {
    let Path(seller_id) = seller_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .lifecycle
        .gateway()
        .get_seller(seller_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("seller {seller_id} not found")))
}

/// GET /sellers
pub async fn sellers_list<G: PersistenceGateway>(
    State(state): State<Arc<AppState<G>>>,
) -> Result<Json<Value>, ApiError> {
    let sellers = state.lifecycle.gateway().list_sellers().await?;
    Ok(Json(json!({ "sellers": sellers })))
}
