//! Device endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::{Device, DeviceView, RegisterDeviceRequest, UpdateDeviceRequest};

use super::commands;

/// Response for a successful deletion.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_devices).post(register_device))
        .route(
            "/:device_id",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route(
            "/:device_id/command",
            get(commands::command_history).post(commands::send_command),
        )
}

/// List all devices with their slots and latest status.
///
/// GET /api/devices
pub async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceView>>, ApiError> {
    let devices = state.services.registry.list().await?;
    Ok(Json(devices))
}

/// Register a device by probing it with `stat`.
///
/// POST /api/devices
pub async fn register_device(
    State(state): State<AppState>,
    Json(request): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceView>), ApiError> {
    request.validate()?;
    let view = state.services.registry.register(request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/devices/:device_id
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceView>, ApiError> {
    state
        .services
        .registry
        .get(&device_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))
}

/// PUT /api/devices/:device_id
pub async fn update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<UpdateDeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    request.validate()?;
    state
        .services
        .registry
        .update(&device_id, &request)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))
}

/// Delete a device and everything recorded for it.
///
/// DELETE /api/devices/:device_id
pub async fn delete_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.services.registry.delete(&device_id).await? {
        return Err(ApiError::NotFound("Device not found".to_string()));
    }
    Ok(Json(DeletedResponse { success: true }))
}
