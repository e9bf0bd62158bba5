//! Common test utilities for integration tests.
//!
//! Every test app runs against the in-process store, a scripted device client
//! and a recording notifier, so no database or network is needed.

// Helpers are shared by several test binaries; not all of them use every one.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use domain::models::{DeviceStatus, NewDevice};
use domain::services::MockNotificationService;
use gateway_api::{
    app::create_app,
    config::Config,
    services::{MockDeviceClient, Services},
};
use persistence::MemoryStore;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Test configuration. Notifications are routed to the mock regardless of
/// the `notification` section.
pub fn test_config() -> Config {
    serde_json::from_value(json!({
        "server": {
            "host": "127.0.0.1",
            "port": 8080,
            "request_timeout_secs": 30
        },
        "database": {
            "url": "postgres://unused"
        },
        "logging": {
            "level": "warn",
            "format": "pretty"
        },
        "device": {
            "admin_user": "admin",
            "admin_password": "admin",
            "command_timeout_secs": 2,
            "batch_timeout_secs": 1
        },
        "alerts": {
            "weak_signal_dbm": -100,
            "critical_signal_dbm": -110,
            "notify_min_level": "warning"
        }
    }))
    .expect("test config must deserialize")
}

/// A router plus handles on its collaborators.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub client: MockDeviceClient,
    pub notifier: MockNotificationService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = MemoryStore::new();
        let client = MockDeviceClient::new().with_command_store(store.stores().commands.clone());
        let notifier = MockNotificationService::new();

        let services = Services::new(
            &config,
            store.stores(),
            Arc::new(client.clone()),
            Arc::new(notifier.clone()),
        );
        let router = create_app(config, store.stores(), services);

        Self {
            router,
            store,
            client,
            notifier,
        }
    }

    /// Sends one request and returns status and parsed JSON body
    /// (`Value::Null` for empty or non-JSON bodies).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    /// Posts a device callback.
    pub async fn callback(&self, event: Value) -> (StatusCode, Value) {
        self.post("/api/callback", event).await
    }

    /// Stores an online device at `ip` without probing it.
    pub async fn seed_device(&self, id: &str, ip: &str) {
        self.store
            .stores()
            .devices
            .register(
                NewDevice {
                    id: id.to_string(),
                    name: format!("Test {}", id),
                    ip: ip.to_string(),
                    token: "device-token".to_string(),
                    status: DeviceStatus::Online,
                },
                Utc::now(),
            )
            .await
            .unwrap();
    }

    /// Audit rows are written on background tasks.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Polls the batch status endpoint until every member is terminal.
pub async fn wait_for_batch(app: &TestApp, batch_id: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = app.get(&format!("/api/batch/{}/status", batch_id)).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("batch {} did not complete", batch_id);
}
