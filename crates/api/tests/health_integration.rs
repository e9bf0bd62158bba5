//! Integration tests for health and metrics endpoints.

mod common;

use axum::http::StatusCode;
use common::{test_config, TestApp};

#[tokio::test]
async fn test_health_check_reports_storage_and_scheduler() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["connected"], true);
    assert!(body["version"].is_string());
    assert_eq!(body["scheduler"]["internal_ticker"], false);
}

#[tokio::test]
async fn test_health_reflects_internal_ticker_setting() {
    let mut config = test_config();
    config.scheduler.internal_ticker = true;
    let app = TestApp::with_config(config);

    let (_, body) = app.get("/api/health").await;
    assert_eq!(body["scheduler"]["internal_ticker"], true);
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = app.get("/api/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_request_id_header_is_echoed() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .uri("/api/health/live")
        .header("x-request-id", "req-abc")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-abc"
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
