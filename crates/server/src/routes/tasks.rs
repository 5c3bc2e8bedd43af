use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sitesmith_core::{PhaseRecord, Task};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTasksQuery {
    /// Maximum number of tasks, newest first
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PhasesResponse {
    pub task_id: Uuid,
    pub phases: Vec<PhaseRecord>,
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "Tasks, newest first", body = Vec<Task>)
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let tasks = state.task_repository.find_all(limit).await?;
    Ok(Json(tasks))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task", body = Task),
        (status = 404, description = "Task not found"),
    ),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    match state.task_repository.find_by_id(id).await? {
        Some(t) => Ok(Json(t)),
        None => Err(AppError::NotFound(format!("Task not found: {}", id))),
    }
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}/phases",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Phase history in order", body = PhasesResponse),
        (status = 404, description = "Task not found"),
    ),
    tag = "tasks"
)]
pub async fn get_task_phases(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PhasesResponse>, AppError> {
    if state.task_repository.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Task not found: {}", id)));
    }

    let phases = state.task_repository.phase_history(id).await?;
    Ok(Json(PhasesResponse { task_id: id, phases }))
}
