//! HTTP client for gateway devices.
//!
//! Devices expose a single control endpoint:
//! `GET http://<address>/ctrl?token=..&cmd=..&p1..p7=..&tid=..`
//! and answer with a JSON object whose `code` is 0 on success.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::models::event::int_value;
use domain::models::{command::DeviceParams, CommandName, CommandRecord};
use domain::store::CommandStore;
use reqwest::{Client, Url};
use serde_json::{json, Value};

/// Code reported when the device reply carries none.
pub const MISSING_CODE: i64 = -1;

/// One outbound control request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub address: String,
    pub token: String,
    pub command: CommandName,
    pub params: DeviceParams,
    pub tid: String,
}

impl DeviceRequest {
    /// Builds the control URL with every value percent-encoded.
    pub fn url(&self) -> Result<Url, DeviceClientError> {
        let mut pairs: Vec<(&str, &str)> = vec![
            ("token", self.token.as_str()),
            ("cmd", self.command.as_str()),
        ];
        pairs.extend(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        pairs.push(("tid", self.tid.as_str()));

        Url::parse_with_params(&format!("http://{}/ctrl", self.address), &pairs)
            .map_err(|e| DeviceClientError::InvalidAddress(format!("{}: {}", self.address, e)))
    }
}

/// Parsed device reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReply {
    pub code: i64,
    pub body: Value,
}

impl DeviceReply {
    pub fn from_body(body: Value) -> Self {
        let code = body.get("code").and_then(int_value).unwrap_or(MISSING_CODE);
        Self { code, body }
    }

    pub fn accepted(&self) -> bool {
        self.code == 0
    }

    /// Device-supplied error text, if any.
    pub fn message(&self) -> Option<String> {
        self.body
            .get("msg")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceClientError {
    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Transport to the devices. Implementations must not retry.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn send(
        &self,
        request: &DeviceRequest,
        timeout: Duration,
    ) -> Result<DeviceReply, DeviceClientError>;
}

/// reqwest-backed device client. One connection pool for all devices.
#[derive(Clone)]
pub struct HttpDeviceClient {
    client: Client,
}

impl HttpDeviceClient {
    pub fn new() -> Result<Self, DeviceClientError> {
        let client = Client::builder()
            .user_agent(concat!("gsm-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeviceClientError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn send(
        &self,
        request: &DeviceRequest,
        timeout: Duration,
    ) -> Result<DeviceReply, DeviceClientError> {
        let url = request.url()?;

        tracing::debug!(
            address = %request.address,
            command = %request.command,
            tid = %request.tid,
            "Sending device command"
        );

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                DeviceClientError::Timeout(timeout)
            } else {
                DeviceClientError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        let text = response.text().await.map_err(map_err)?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body @ Value::Object(_)) => Ok(DeviceReply::from_body(body)),
            _ if !status.is_success() => Err(DeviceClientError::InvalidResponse(format!(
                "HTTP {}",
                status.as_u16()
            ))),
            _ => Err(DeviceClientError::InvalidResponse(format!(
                "expected JSON object, got {:?}",
                text.chars().take(64).collect::<String>()
            ))),
        }
    }
}

/// Scripted behaviour for one address of the [`MockDeviceClient`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Reply(Value),
    Timeout,
    Unreachable,
}

#[derive(Debug, Default)]
struct MockState {
    scripted: HashMap<String, MockReply>,
    requests: Vec<DeviceRequest>,
    rows_at_send: Vec<(String, Option<CommandRecord>)>,
}

/// In-process device client for tests.
///
/// Answers `{"code":0}` unless a reply is scripted for the address, and
/// records every request it receives.
#[derive(Clone, Default)]
pub struct MockDeviceClient {
    state: Arc<Mutex<MockState>>,
    commands: Option<Arc<dyn CommandStore>>,
}

impl std::fmt::Debug for MockDeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDeviceClient")
            .field("state", &self.state)
            .field("commands", &self.commands.is_some())
            .finish()
    }
}

impl MockDeviceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reads each request's command row from `commands` as the request
    /// arrives.
    pub fn with_command_store(mut self, commands: Arc<dyn CommandStore>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// `(tid, row)` as the row stood when each request arrived, oldest first.
    /// Empty unless built with [`MockDeviceClient::with_command_store`].
    pub fn rows_at_send(&self) -> Vec<(String, Option<CommandRecord>)> {
        self.state
            .lock()
            .map(|s| s.rows_at_send.clone())
            .unwrap_or_default()
    }

    pub fn script(&self, address: &str, reply: MockReply) {
        if let Ok(mut state) = self.state.lock() {
            state.scripted.insert(address.to_string(), reply);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<DeviceRequest> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeviceClient for MockDeviceClient {
    async fn send(
        &self,
        request: &DeviceRequest,
        timeout: Duration,
    ) -> Result<DeviceReply, DeviceClientError> {
        let row = match &self.commands {
            Some(commands) => Some(commands.find(&request.tid).await.ok().flatten()),
            None => None,
        };

        let scripted = match self.state.lock() {
            Ok(mut state) => {
                state.requests.push(request.clone());
                if let Some(row) = row {
                    state.rows_at_send.push((request.tid.clone(), row));
                }
                state.scripted.get(&request.address).cloned()
            }
            Err(_) => None,
        };

        match scripted.unwrap_or_else(|| MockReply::Reply(json!({ "code": 0 }))) {
            MockReply::Reply(body) => Ok(DeviceReply::from_body(body)),
            MockReply::Timeout => Err(DeviceClientError::Timeout(timeout)),
            MockReply::Unreachable => Err(DeviceClientError::Transport(format!(
                "connection refused: {}",
                request.address
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(params: DeviceParams) -> DeviceRequest {
        DeviceRequest {
            address: "192.168.1.20".into(),
            token: "abc".into(),
            command: CommandName::Sendsms,
            params,
            tid: "t-1".into(),
        }
    }

    #[test]
    fn test_url_encodes_params_in_order() {
        let url = request(vec![
            ("p1".into(), "1".into()),
            ("p2".into(), "+123".into()),
            ("p3".into(), "hi there & bye".into()),
        ])
        .url()
        .unwrap();

        assert_eq!(url.host_str(), Some("192.168.1.20"));
        assert_eq!(url.path(), "/ctrl");
        assert_eq!(
            url.query(),
            Some("token=abc&cmd=sendsms&p1=1&p2=%2B123&p3=hi+there+%26+bye&tid=t-1")
        );
    }

    #[test]
    fn test_url_keeps_port() {
        let mut req = request(vec![]);
        req.address = "10.0.0.5:8080".into();
        let url = req.url().unwrap();
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_url_rejects_bad_address() {
        let mut req = request(vec![]);
        req.address = "not a host/".into();
        assert!(matches!(req.url(), Err(DeviceClientError::InvalidAddress(_))));
    }

    #[test]
    fn test_reply_code() {
        assert!(DeviceReply::from_body(json!({"code": 0})).accepted());
        assert!(DeviceReply::from_body(json!({"code": "0"})).accepted());

        let rejected = DeviceReply::from_body(json!({"code": 7, "msg": "busy"}));
        assert!(!rejected.accepted());
        assert_eq!(rejected.message().as_deref(), Some("busy"));

        assert_eq!(DeviceReply::from_body(json!({})).code, MISSING_CODE);
    }

    #[tokio::test]
    async fn test_mock_defaults_to_success_and_records() {
        let mock = MockDeviceClient::new();
        let reply = mock
            .send(&request(vec![]), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(reply.accepted());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_scripted_failures() {
        let mock = MockDeviceClient::new();
        mock.script("192.168.1.20", MockReply::Timeout);
        let err = mock
            .send(&request(vec![]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, DeviceClientError::Timeout(Duration::from_secs(5)));

        mock.script("192.168.1.20", MockReply::Unreachable);
        let err = mock
            .send(&request(vec![]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceClientError::Transport(_)));
    }
}
