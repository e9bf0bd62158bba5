//! Device callback endpoint.
//!
//! Devices push every event here. The body is parsed leniently: anything that
//! is not a JSON object with a `devId` gets the `101` ack, everything else
//! gets `{code: 0}` whatever the ingestor made of it.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::Value;

use crate::app::AppState;
use crate::services::Ack;

const FORWARDED_FOR: &str = "x-forwarded-for";

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(receive))
}

/// POST /api/callback
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Ack>) {
    let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    let ack = state
        .services
        .ingestor
        .ingest(body, forwarded_peer(&headers))
        .await;

    let status = if ack.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(ack))
}

/// First hop of `X-Forwarded-For`.
fn forwarded_peer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
