//! Scheduled task management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::TaskRun;
use domain::models::{AuditAction, CreateTaskRequest, ScheduledTask, UpdateTaskRequest};
use domain::services::audit_helpers;

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub success: bool,
    #[serde(flatten)]
    pub run: TaskRun,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route(
            "/:task_id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/:task_id/run", post(run_task))
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Task not found: {}", id))
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduledTask>>, ApiError> {
    Ok(Json(state.stores.tasks.list().await?))
}

/// Create a task. The schedule and command are checked before anything is stored.
///
/// POST /api/tasks
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<ScheduledTask>), ApiError> {
    request.validate()?;
    let new_task = request.into_new_task()?;
    let task = state.stores.tasks.create(new_task, Utc::now()).await?;

    tracing::info!(task_id = task.id, name = %task.name, schedule = %task.schedule, "Task created");
    state.services.audit.record(audit_helpers::task_changed(
        AuditAction::TaskCreate,
        task.id,
        Some(&task.name),
    ));
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks/:task_id
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<ScheduledTask>, ApiError> {
    state
        .stores
        .tasks
        .find(task_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(task_id))
}

/// Partial update. Omitted fields keep their value; `null` clears the
/// nullable ones.
///
/// PUT /api/tasks/:task_id
pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<ScheduledTask>, ApiError> {
    request.validate()?;
    let current = state
        .stores
        .tasks
        .find(task_id)
        .await?
        .ok_or_else(|| not_found(task_id))?;

    let patch = request.into_patch(&current)?;
    let task = state
        .stores
        .tasks
        .update(task_id, patch, Utc::now())
        .await?
        .ok_or_else(|| not_found(task_id))?;

    state.services.audit.record(audit_helpers::task_changed(
        AuditAction::TaskUpdate,
        task.id,
        Some(&task.name),
    ));
    Ok(Json(task))
}

/// DELETE /api/tasks/:task_id
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.stores.tasks.delete(task_id).await? {
        return Err(not_found(task_id));
    }
    state
        .services
        .audit
        .record(audit_helpers::task_changed(AuditAction::TaskDelete, task_id, None));
    Ok(Json(DeletedResponse { success: true }))
}

/// Execute a task now, whatever its schedule or trigger.
///
/// POST /api/tasks/:task_id/run
pub async fn run_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state
        .services
        .scheduler
        .run_now(task_id)
        .await?
        .ok_or_else(|| not_found(task_id))?;
    Ok(Json(RunResponse { success: true, run }))
}
