//! Batch command endpoints.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::{BatchStatus, StartBatchRequest, StartBatchResponse};
use domain::services::audit::API_ACTOR;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_batch))
        .route("/:batch_id/status", get(batch_status))
}

/// Queue one command for many devices. Delivery continues in the background.
///
/// POST /api/batch
pub async fn start_batch(
    State(state): State<AppState>,
    Json(request): Json<StartBatchRequest>,
) -> Result<Json<StartBatchResponse>, ApiError> {
    request.validate()?;
    let response = state
        .services
        .batches
        .start(request, Some(API_ACTOR.to_string()))
        .await?;
    Ok(Json(response))
}

/// GET /api/batch/:batch_id/status
pub async fn batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchStatus>, ApiError> {
    state
        .services
        .batches
        .status(&batch_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Batch not found: {}", batch_id)))
}
