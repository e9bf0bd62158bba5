//! Audit log listing.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use shared::pagination::{PageInfo, PageRequest, DEFAULT_LIMIT};

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::{AuditAction, AuditLog, ListAuditLogsQuery};

#[derive(Debug, Serialize)]
pub struct ListAuditLogsResponse {
    pub logs: Vec<AuditLog>,
    pub pagination: PageInfo,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_audit_logs))
}

/// Newest first, optionally filtered by action.
///
/// GET /api/audit?page=&limit=&action=
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<ListAuditLogsQuery>,
) -> Result<Json<ListAuditLogsResponse>, ApiError> {
    let action = query
        .action
        .as_deref()
        .filter(|a| !a.is_empty())
        .map(str::parse::<AuditAction>)
        .transpose()
        .map_err(ApiError::Validation)?;

    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_LIMIT),
    );
    let (logs, total) = state
        .stores
        .audit
        .list(action, page.limit(), page.offset())
        .await?;

    Ok(Json(ListAuditLogsResponse {
        logs,
        pagination: PageInfo::new(&page, total),
    }))
}
