//! Integration tests for batch commands.

mod common;

use axum::http::StatusCode;
use common::{wait_for_batch, TestApp};
use gateway_api::services::MockReply;
use serde_json::json;

#[tokio::test]
async fn test_batch_reports_per_device_outcomes() {
    let app = TestApp::new();
    app.seed_device("GW-1", "10.1.0.1").await;
    app.seed_device("GW-2", "10.1.0.2").await;
    app.seed_device("GW-3", "unknown").await;
    app.client.script(
        "10.1.0.2",
        MockReply::Reply(json!({"code": 3, "msg": "busy"})),
    );

    let (status, body) = app
        .post(
            "/api/batch",
            json!({
                "targetIds": ["GW-1", "GW-2", "GW-3", "GW-missing"],
                "command": "restart",
                "batchName": "Nightly restart"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 3);
    let batch_id = body["batchId"].as_str().unwrap().to_string();

    let report = wait_for_batch(&app, &batch_id).await;
    assert_eq!(report["batchId"], batch_id.as_str());
    assert_eq!(report["batchName"], "Nightly restart");
    assert_eq!(report["total"], 3);
    assert_eq!(report["completed"], 3);

    let results = report["results"].as_array().unwrap();
    let result_for = |id: &str| {
        results
            .iter()
            .find(|r| r["deviceId"] == id)
            .cloned()
            .unwrap()
    };
    assert_eq!(result_for("GW-1")["success"], true);
    assert_eq!(result_for("GW-2")["success"], false);
    assert_eq!(result_for("GW-2")["error"], "busy");
    assert_eq!(result_for("GW-3")["success"], false);
    assert!(result_for("GW-3")["error"].as_str().unwrap().contains("IP"));

    // No request ever went to the device without an address.
    assert_eq!(app.client.requests().len(), 2);
}

#[tokio::test]
async fn test_one_unreachable_member_does_not_stop_siblings() {
    let app = TestApp::new();
    app.seed_device("GW-1", "10.2.0.1").await;
    app.seed_device("GW-2", "10.2.0.2").await;
    app.client.script("10.2.0.1", MockReply::Unreachable);

    let (_, body) = app
        .post(
            "/api/batch",
            json!({"targetIds": ["GW-1", "GW-2"], "command": "stat"}),
        )
        .await;
    let report = wait_for_batch(&app, body["batchId"].as_str().unwrap()).await;

    let successes = report["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["success"] == true)
        .count();
    assert_eq!(successes, 1);
    assert!(report["batchName"]
        .as_str()
        .unwrap()
        .starts_with("Batch stat - "));
}

#[tokio::test]
async fn test_batch_rejects_invalid_command() {
    let app = TestApp::new();
    app.seed_device("GW-1", "10.3.0.1").await;

    let (status, _) = app
        .post(
            "/api/batch",
            json!({"targetIds": ["GW-1"], "command": "rm -rf"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.client.requests().is_empty());
}

#[tokio::test]
async fn test_batch_requires_targets() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/batch", json!({"targetIds": [], "command": "stat"}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_unknown_batch_status_is_404() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/batch/does-not-exist/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
