//! Integration tests for device management and direct commands.

mod common;

use axum::http::StatusCode;
use common::TestApp;
use fake::faker::company::en::CompanyName;
use fake::Fake;
use gateway_api::services::MockReply;
use serde_json::json;

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_device_uses_stat_reply() {
    let app = TestApp::new();
    app.client.script(
        "192.168.1.60",
        MockReply::Reply(json!({
            "code": 0,
            "devId": "GW-A1",
            "slot": {"slot1_sta": "OK", "sim1_op": "Carrier", "sim1_dbm": "-85dBm"}
        })),
    );

    let (status, body) = app
        .post(
            "/api/devices",
            json!({"ip": "192.168.1.60", "token": "secret", "name": "Front desk"}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "GW-A1");
    assert_eq!(body["name"], "Front desk");
    assert_eq!(body["status"], "online");
    assert_eq!(body["slots"][0]["operator"], "Carrier");
    assert_eq!(body["slots"][0]["signalStrength"], -85);

    let stat = &app.client.requests()[0];
    assert_eq!(stat.command.as_str(), "stat");
    assert_eq!(stat.token, "secret");
}

#[tokio::test]
async fn test_register_unreachable_device_without_id_fails() {
    let app = TestApp::new();
    app.client.script("192.168.1.61", MockReply::Timeout);

    let (status, body) = app
        .post("/api/devices", json!({"ip": "192.168.1.61", "token": "secret"}))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "device_error");
}

#[tokio::test]
async fn test_register_unreachable_device_with_id_is_offline() {
    let app = TestApp::new();
    app.client.script("192.168.1.62", MockReply::Unreachable);

    let (status, body) = app
        .post(
            "/api/devices",
            json!({"ip": "192.168.1.62", "token": "secret", "devId": "GW-B2"}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "GW-B2");
    assert_eq!(body["status"], "offline");
}

#[tokio::test]
async fn test_register_requires_ip_and_token() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/devices", json!({"ip": "", "token": ""}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(app.client.requests().is_empty());
}

// ============================================================================
// View, update, delete
// ============================================================================

#[tokio::test]
async fn test_get_unknown_device_returns_404() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/devices/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_update_and_delete_device() {
    let app = TestApp::new();
    app.seed_device("GW-C3", "10.0.0.3").await;

    let (status, body) = app
        .put("/api/devices/GW-C3", json!({"name": "Warehouse"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Warehouse");
    assert_eq!(body["ip"], "10.0.0.3");

    let (status, body) = app.delete("/api/devices/GW-C3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app.get("/api/devices/GW-C3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.delete("/api/devices/GW-C3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_cascades_to_device_history() {
    let app = TestApp::new();
    app.seed_device("GW-C4", "10.0.0.4").await;
    app.post("/api/devices/GW-C4/command", json!({"command": "stat"}))
        .await;

    app.delete("/api/devices/GW-C4").await;

    let (_, history) = app.get("/api/devices/GW-C4/command").await;
    assert_eq!(history, json!([]));
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_command_accepted_by_device() {
    let app = TestApp::new();
    app.seed_device("GW-D1", "10.0.1.1").await;

    let (status, body) = app
        .post("/api/devices/GW-D1/command", json!({"command": "restart"}))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["code"], 0);
    let tid = body["tid"].as_str().unwrap().to_string();

    let request = &app.client.requests()[0];
    assert_eq!(request.tid, tid);
    assert_eq!(request.token, "device-token");
    assert!(request
        .url()
        .unwrap()
        .as_str()
        .starts_with("http://10.0.1.1/ctrl?token=device-token&cmd=restart"));

    let (_, history) = app.get("/api/devices/GW-D1/command").await;
    assert_eq!(history[0]["id"], tid.as_str());
    assert_eq!(history[0]["status"], "success");
    assert!(history[0]["executedAt"].is_string());
}

#[tokio::test]
async fn test_invalid_command_is_rejected_before_io() {
    let app = TestApp::new();
    app.seed_device("GW-D2", "10.0.1.2").await;

    let (status, body) = app
        .post("/api/devices/GW-D2/command", json!({"command": "format"}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("sendsms"));
    assert!(app.client.requests().is_empty());
    let (_, history) = app.get("/api/devices/GW-D2/command").await;
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn test_device_rejection_is_reported_not_raised() {
    let app = TestApp::new();
    app.seed_device("GW-D3", "10.0.1.3").await;
    app.client.script(
        "10.0.1.3",
        MockReply::Reply(json!({"code": 7, "msg": "slot busy"})),
    );

    let (status, body) = app
        .post(
            "/api/devices/GW-D3/command",
            json!({"command": "slotrst", "slot": 2}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["result"]["msg"], "slot busy");

    let request = &app.client.requests()[0];
    assert!(request.params.contains(&("p1".to_string(), "2".to_string())));

    let (_, history) = app.get("/api/devices/GW-D3/command").await;
    assert_eq!(history[0]["status"], "failed");
}

#[tokio::test]
async fn test_unreachable_device_returns_502_and_records_failure() {
    let app = TestApp::new();
    app.seed_device("GW-D4", "10.0.1.4").await;
    app.client.script("10.0.1.4", MockReply::Timeout);

    let (status, body) = app
        .post("/api/devices/GW-D4/command", json!({"command": "stat"}))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "device_error");

    let (_, history) = app.get("/api/devices/GW-D4/command").await;
    assert_eq!(history[0]["status"], "failed");
    assert!(history[0]["result"]["msg"].is_string());
}

#[tokio::test]
async fn test_command_for_unknown_device_returns_404() {
    let app = TestApp::new();

    let (status, _) = app
        .post("/api/devices/ghost/command", json!({"command": "stat"}))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.client.requests().is_empty());
}

#[tokio::test]
async fn test_sendsms_command_requires_phone() {
    let app = TestApp::new();
    app.seed_device("GW-D5", "10.0.1.5").await;

    let (status, _) = app
        .post(
            "/api/devices/GW-D5/command",
            json!({"command": "sendsms", "content": "hi"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.client.requests().is_empty());
}

#[tokio::test]
async fn test_register_keeps_given_names() {
    let app = TestApp::new();

    for n in 1..=3 {
        let name: String = CompanyName().fake();
        let (status, body) = app
            .post(
                "/api/devices",
                json!({
                    "ip": format!("10.9.0.{}", n),
                    "token": "t",
                    "name": name,
                    "devId": format!("GW-F{}", n)
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], name.as_str());
    }

    let (_, list) = app.get("/api/devices").await;
    assert_eq!(list.as_array().unwrap().len(), 3);
}
