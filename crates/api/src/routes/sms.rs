//! SMS endpoints.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use shared::pagination::{DEFAULT_LIMIT, MAX_LIMIT};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::{BatchSmsReceipt, DispatchOutcome, OutgoingSms};
use domain::models::{BatchSmsRequest, SendSmsRequest, SmsFilter, SmsMessage};
use domain::services::audit::API_ACTOR;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_messages))
        .route("/send", post(send_sms))
        .route("/batch", post(send_batch))
}

#[derive(Debug, Serialize)]
pub struct BatchSmsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub receipt: BatchSmsReceipt,
}

/// GET /api/sms
pub async fn list_messages(
    State(state): State<AppState>,
    Query(filter): Query<SmsFilter>,
) -> Result<Json<Vec<SmsMessage>>, ApiError> {
    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(state.stores.sms.list(&filter, limit).await?))
}

/// Send a text through one of a device's slots.
///
/// The returned tid is also the message id; the device's later 502 callback
/// confirms delivery against it.
///
/// POST /api/sms/send
pub async fn send_sms(
    State(state): State<AppState>,
    Json(request): Json<SendSmsRequest>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    request.validate()?;
    let outcome = state
        .services
        .dispatcher
        .send_sms(
            OutgoingSms {
                device_id: request.device_id,
                slot: request.slot,
                phone: request.phone,
                content: request.content,
            },
            Some(API_ACTOR.to_string()),
        )
        .await?;
    Ok(Json(outcome))
}

/// Fan one text out to every phone from every listed device.
///
/// Outgoing rows are created up front as `pending`. Without `scheduledTime`
/// the sends run in the background; otherwise a one-shot `batch_sms` task is
/// created for the same rows.
///
/// POST /api/sms/batch
pub async fn send_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchSmsRequest>,
) -> Result<Json<BatchSmsResponse>, ApiError> {
    request.validate()?;
    let receipt = state
        .services
        .scheduler
        .submit_batch_sms(request, Some(API_ACTOR.to_string()))
        .await?;
    Ok(Json(BatchSmsResponse {
        success: true,
        receipt,
    }))
}
