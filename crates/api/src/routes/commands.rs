//! Per-device command endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::DispatchOutcome;
use domain::models::{CommandRecord, CommandRequest};
use domain::services::audit::API_ACTOR;

const HISTORY_LIMIT: i64 = 50;

/// Send one command and wait for the device's answer.
///
/// A device that answers with a non-zero code still yields 200 with
/// `success: false`; a device that cannot be reached yields 502.
///
/// POST /api/devices/:device_id/command
pub async fn send_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    let outcome = state
        .services
        .dispatcher
        .dispatch(
            &device_id,
            &request.command,
            request.params,
            Some(API_ACTOR.to_string()),
        )
        .await?;
    Ok(Json(outcome))
}

/// Most recent commands for a device, newest first.
///
/// GET /api/devices/:device_id/command
pub async fn command_history(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<CommandRecord>>, ApiError> {
    let records = state
        .stores
        .commands
        .list_for_device(&device_id, HISTORY_LIMIT)
        .await?;
    Ok(Json(records))
}
