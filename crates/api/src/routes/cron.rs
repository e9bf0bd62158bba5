//! External scheduler trigger.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct TickResponse {
    pub success: bool,
    /// Ids of the tasks that fired on this tick.
    pub executed: Vec<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(tick).post(tick))
}

/// Runs one scheduler tick. Safe to call as often as the caller likes.
///
/// GET|POST /api/cron
pub async fn tick(State(state): State<AppState>) -> Result<Json<TickResponse>, ApiError> {
    let executed = state.services.scheduler.tick(Utc::now()).await?;
    Ok(Json(TickResponse {
        success: true,
        executed,
    }))
}
