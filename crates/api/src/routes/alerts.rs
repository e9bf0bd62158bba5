//! Alert endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::{Alert, AlertFilter};
use domain::services::audit_helpers;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alerts))
        .route("/:alert_id", put(resolve_alert))
}

/// Newest first. `?unresolvedOnly=true` hides resolved alerts.
///
/// GET /api/alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    Ok(Json(state.services.alerts.list(&filter).await?))
}

/// PUT /api/alerts/:alert_id
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<i64>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .services
        .alerts
        .resolve(alert_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Alert not found: {}", alert_id)))?;

    state.services.audit.record(audit_helpers::alert_resolved(alert_id));
    Ok(Json(alert))
}
