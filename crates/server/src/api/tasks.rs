//! Task status polling.

use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use offers_core::{Task, TaskId};
use offers_ingest::{PersistenceGateway, TaskPage};

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /tasks/{task_id}
pub async fn tasks_get<G: PersistenceGateway>(
    State(state): State<Arc<AppState<G>>>,
    task_id: Result<Path<TaskId>, PathRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(task_id) = task_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .lifecycle
        .gateway()
        .get_task(task_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))
}

/// GET /tasks?limit=&offset=
pub async fn tasks_list<G: PersistenceGateway>(
    State(state): State<Arc<AppState<G>>>,
    query: Result<Query<TaskListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let page = TaskPage {
        limit: query.limit,
        offset: query.offset,
    };
    let tasks = state.lifecycle.gateway().list_tasks(page).await?;
    Ok(Json(json!({ "tasks": tasks })))
}
