//! Bulk offer upload.

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::PathRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};

use offers_core::SellerId;
use offers_ingest::PersistenceGateway;

use super::ApiError;
use crate::state::AppState;

/// POST /sellers/{seller_id}/offers/load
///
/// Buffers the workbook from the configured multipart field, creates a
/// `running` task and answers with its id. Processing happens in the
/// background; poll `/tasks/{task_id}` for the result.
pub async fn offers_load<G: PersistenceGateway>(
    State(state): State<Arc<AppState<G>>>,
    seller_id: Result<Path<SellerId>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(seller_id) = seller_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    // Checked before the body is read.
    if !state.lifecycle.gateway().seller_exists(seller_id).await? {
        return Err(ApiError::BadRequest(format!("seller {seller_id} does not exist")));
    }

    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let file = read_field(&mut multipart, &state.config.ingest.upload_field).await?;

    let task_id = state.lifecycle.submit_ingestion(file, seller_id).await?;
    Ok(Json(json!({ "task_id": task_id })))
}

async fn read_field(multipart: &mut Multipart, name: &str) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(name) {
            return field.bytes().await.map_err(multipart_error);
        }
    }
    Err(ApiError::BadRequest(format!("multipart field '{name}' is missing")))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
