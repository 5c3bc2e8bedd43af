use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use events::Event;
use serde::Serialize;
use sitesmith_core::{Task, TaskPhase, TaskStatus, TaskSubmission};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const ESTIMATED_COMPLETION_MINUTES: u32 = 5;

#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptedResponse {
    pub task: String,
    pub status: String,
    pub message: String,
    pub nonce: String,
    pub task_id: Uuid,
    pub estimated_completion_time_minutes: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub task: String,
    pub round: u32,
    pub status: TaskStatus,
    pub phase: Option<TaskPhase>,
    pub act_attempts: u32,
    pub repo_url: Option<String>,
    pub pages_url: Option<String>,
    pub commit_sha: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            task: task.task,
            round: task.round,
            status: task.status,
            phase: task.phase,
            act_attempts: task.act_attempts,
            repo_url: task.repo_url,
            pages_url: task.pages_url,
            commit_sha: task.commit_sha,
            error: task.error_message,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/request",
    request_body = TaskSubmission,
    responses(
        (status = 200, description = "Task accepted and queued", body = AcceptedResponse),
        (status = 400, description = "Invalid submission"),
        (status = 401, description = "Secret mismatch"),
        (status = 409, description = "Nonce already used"),
    ),
    tag = "requests"
)]
pub async fn submit_request(
    State(state): State<AppState>,
    Json(submission): Json<TaskSubmission>,
) -> Result<Json<AcceptedResponse>, AppError> {
    submission.validate()?;

    if !state.verify_secret(&submission.secret) {
        warn!(task = %submission.task, round = submission.round, "Rejected submission with invalid secret");
        return Err(AppError::Unauthorized("Invalid secret".to_string()));
    }

    if state
        .task_repository
        .find_by_nonce(&submission.nonce)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "Nonce already used: {}",
            submission.nonce
        )));
    }

    let task = state.task_repository.create(&Task::from(submission)).await?;
    info!(
        task_id = %task.id,
        task = %task.task,
        round = task.round,
        checks = task.checks.len(),
        attachments = task.attachments.len(),
        "Task accepted"
    );

    state.event_bus.emit(Event::TaskAccepted {
        task_id: task.id,
        task: task.task.clone(),
        round: task.round,
    });

    let response = AcceptedResponse {
        task: task.task.clone(),
        status: "accepted".to_string(),
        message: format!(
            "Round {} accepted. The site will be built and deployed in the background.",
            task.round
        ),
        nonce: task.nonce.clone(),
        task_id: task.id,
        estimated_completion_time_minutes: ESTIMATED_COMPLETION_MINUTES,
    };

    // the handle is dropped; progress is visible through status and events
    drop(state.runner.submit(task));

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/status/{task}",
    params(
        ("task" = String, Path, description = "Caller-supplied task identifier"),
    ),
    responses(
        (status = 200, description = "Status of the latest round", body = TaskStatusResponse),
        (status = 404, description = "Unknown task"),
    ),
    tag = "requests"
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(task): Path<String>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    match state.task_repository.find_latest_by_task(&task).await? {
        Some(task) => Ok(Json(task.into())),
        None => Err(AppError::NotFound(format!("Task not found: {}", task))),
    }
}
