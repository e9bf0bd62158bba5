//! Call log.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use shared::pagination::{DEFAULT_LIMIT, MAX_LIMIT};

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::CallRecord;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsQuery {
    pub device_id: Option<String>,
    pub limit: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_calls))
}

/// GET /api/calls
pub async fn list_calls(
    State(state): State<AppState>,
    Query(query): Query<CallsQuery>,
) -> Result<Json<Vec<CallRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let calls = state
        .stores
        .calls
        .list(query.device_id.as_deref(), limit)
        .await?;
    Ok(Json(calls))
}
