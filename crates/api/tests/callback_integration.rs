//! Integration tests for the device callback endpoint.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_missing_device_id_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.callback(json!({"type": 998})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 101);
    assert_eq!(body["msg"], "Missing devId");
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 101);
}

#[tokio::test]
async fn test_unknown_event_is_acked_and_ignored() {
    let app = TestApp::new();

    let (status, body) = app.callback(json!({"devId": "GW01", "type": 4242})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"code": 0}));
    let (_, devices) = app.get("/api/devices").await;
    assert_eq!(devices, json!([]));
}

#[tokio::test]
async fn test_heartbeat_creates_device_with_address() {
    let app = TestApp::new();

    let (status, _) = app
        .callback(json!({
            "devId": "GW0001",
            "type": 998,
            "wifi": {"ip": "192.168.1.40", "ssid": "office", "dbm": -60}
        }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, device) = app.get("/api/devices/GW0001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(device["ip"], "192.168.1.40");
    assert_eq!(device["status"], "online");
    assert_eq!(device["name"], "Device 0001");
    assert_eq!(device["latestStatus"]["wifiSsid"], "office");
    assert!(device.get("token").is_none());
}

#[tokio::test]
async fn test_heartbeat_falls_back_to_forwarded_address() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "10.9.8.7, 172.16.0.1")
        .body(Body::from(json!({"devId": "GW0002", "type": 998}).to_string()))
        .unwrap();

    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, device) = app.get("/api/devices/GW0002").await;
    assert_eq!(device["ip"], "10.9.8.7");
}

#[tokio::test]
async fn test_non_heartbeat_does_not_move_device() {
    let app = TestApp::new();
    app.seed_device("GW0003", "10.0.0.3").await;

    app.callback(json!({"devId": "GW0003", "type": 209, "slot": 1, "ip": "10.0.0.99"}))
        .await;

    let (_, device) = app.get("/api/devices/GW0003").await;
    assert_eq!(device["ip"], "10.0.0.3");
}

#[tokio::test]
async fn test_weak_wifi_opens_alert_and_notifies_once() {
    let app = TestApp::new();
    let weak = json!({"devId": "GW0004", "type": 998, "wifi": {"dbm": -105}});

    app.callback(weak.clone()).await;
    app.callback(weak).await;
    app.settle().await;

    let (_, alerts) = app.get("/api/alerts?unresolvedOnly=true").await;
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["type"], "wifi_signal");
    assert_eq!(alerts[0]["level"], "warning");
    assert_eq!(app.notifier.sent().len(), 1);

    app.callback(json!({"devId": "GW0004", "type": 998, "wifi": {"dbm": -70}}))
        .await;
    let (_, open) = app.get("/api/alerts?unresolvedOnly=true").await;
    assert_eq!(open, json!([]));
}

#[tokio::test]
async fn test_incoming_sms_is_classified() {
    let app = TestApp::new();

    app.callback(json!({
        "devId": "GW0005",
        "type": 501,
        "slot": 2,
        "phNum": "10690000",
        "content": "Your verification code is 482913",
        "msgTs": 1700000000
    }))
    .await;

    let (status, messages) = app.get("/api/sms?deviceId=GW0005").await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["direction"], "incoming");
    assert_eq!(messages[0]["slotNum"], 2);
    assert_eq!(messages[0]["category"], "verification");
    assert_eq!(messages[0]["timestamp"], "2023-11-14T22:13:20Z");
}

#[tokio::test]
async fn test_ring_then_hangup_completes_call() {
    let app = TestApp::new();

    app.callback(json!({
        "devId": "GW0006",
        "type": 601,
        "slot": 1,
        "phNum": "5550100",
        "startTm": 1700000000
    }))
    .await;
    let (_, calls) = app.get("/api/calls?deviceId=GW0006").await;
    assert_eq!(calls[0]["status"], "ringing");

    app.callback(json!({
        "devId": "GW0006",
        "type": 603,
        "slot": 1,
        "phNum": "5550100",
        "startTm": 1700000000,
        "endTm": 1700000045
    }))
    .await;

    let (_, calls) = app.get("/api/calls?deviceId=GW0006").await;
    let calls = calls.as_array().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["status"], "completed");
    assert_eq!(calls[0]["duration"], 45);
}

#[tokio::test]
async fn test_auto_answer_sends_telanswer() {
    let app = TestApp::new();
    app.seed_device("GW0007", "10.0.0.7").await;
    let (status, _) = app
        .put(
            "/api/devices/GW0007",
            json!({"autoAnswer": true, "ttsContent": "Please hold"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    app.callback(json!({
        "devId": "GW0007",
        "type": 601,
        "slot": 2,
        "phNum": "5550199",
        "startTm": 1700000100
    }))
    .await;
    app.settle().await;

    let requests = app.client.requests();
    let answer = requests
        .iter()
        .find(|r| r.command.as_str() == "telanswer")
        .expect("telanswer sent");
    assert_eq!(answer.address, "10.0.0.7");
    assert!(answer.params.contains(&("p3".to_string(), "Please hold".to_string())));

    let (_, calls) = app.get("/api/calls?deviceId=GW0007").await;
    assert_eq!(calls[0]["status"], "answered");
}
