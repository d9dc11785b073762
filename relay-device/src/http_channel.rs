use std::time::Duration;

use async_trait::async_trait;
use relay_core::RelayConfigSnapshot;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ChannelError, ChannelResult, DeviceChannel, InvocationResult, ResponseTimeout};

/// Hard payload limit of the command channel.
pub const DEFAULT_HARD_LIMIT: u64 = 128 * 1024;

/// Settings for [`HttpMethodChannel`]
#[derive(Debug, Clone)]
pub struct HttpChannelConfig {
    /// Base URL of the device service.
    pub endpoint: String,
    /// Remote operation invoked on every device.
    pub method_name: String,
    pub auth_token: Option<String>,
    /// Bodies above this are staged instead of inlined.
    pub message_size_threshold: u64,
    /// Payloads above this are refused before sending.
    pub hard_limit: u64,
}

impl HttpChannelConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method_name: "RestApi".to_string(),
            auth_token: None,
            message_size_threshold: 64 * 1024,
            hard_limit: DEFAULT_HARD_LIMIT,
        }
    }

    /// Read `device.*` keys. `device.endpoint` is required.
    pub fn from_snapshot(config: &RelayConfigSnapshot) -> anyhow::Result<Self> {
        let endpoint = config
            .get_string("device.endpoint")
            .ok_or_else(|| anyhow::anyhow!("Missing 'device.endpoint' setting"))?;
        let defaults = Self::new(endpoint);

        Ok(Self {
            method_name: config.get_string_or("device.method_name", &defaults.method_name),
            auth_token: config.get_string("device.auth_token"),
            message_size_threshold: config
                .get_u64("device.message_size_threshold")
                .unwrap_or(defaults.message_size_threshold),
            hard_limit: config
                .get_u64("device.hard_limit")
                .unwrap_or(defaults.hard_limit),
            ..defaults
        })
    }

    pub fn with_method_name(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = method_name.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_message_size_threshold(mut self, bytes: u64) -> Self {
        self.message_size_threshold = bytes;
        self
    }
}

#[derive(Deserialize)]
struct MethodReply {
    status: i32,
    #[serde(default)]
    payload: Value,
}

/// Direct-method invocation over a device service's HTTP API.
///
/// Sends `POST {endpoint}/twins/{deviceId}/methods` with
/// `{methodName, responseTimeoutInSeconds, payload}` and expects
/// `{status, payload}` back.
pub struct HttpMethodChannel {
    client: Client,
    config: HttpChannelConfig,
}

impl HttpMethodChannel {
    pub fn new(config: HttpChannelConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn with_client(client: Client, config: HttpChannelConfig) -> Self {
        Self { client, config }
    }

    fn methods_url(&self, device_id: &str) -> String {
        format!(
            "{}/twins/{}/methods",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(device_id)
        )
    }

    fn transport_error(err: reqwest::Error) -> ChannelError {
        if err.is_timeout() {
            ChannelError::operation(format!("device did not answer in time: {err}"))
        } else {
            ChannelError::communication(err.to_string())
        }
    }
}

/// Map a non-success status from the device service, first match wins.
pub(crate) fn classify_status(status: StatusCode, body: String) -> ChannelError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    if status == StatusCode::NOT_FOUND {
        ChannelError::DeviceNotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ChannelError::quota_exceeded(message)
    } else if status == StatusCode::PAYLOAD_TOO_LARGE {
        ChannelError::message_too_large(message)
    } else if status == StatusCode::GATEWAY_TIMEOUT {
        ChannelError::operation(message)
    } else if status.is_server_error() {
        ChannelError::server_error(message)
    } else {
        ChannelError::operation(message)
    }
}

#[async_trait]
impl DeviceChannel for HttpMethodChannel {
    async fn invoke(
        &self,
        device_id: &str,
        payload: &str,
        timeout: ResponseTimeout,
    ) -> ChannelResult<InvocationResult> {
        if payload.len() as u64 > self.config.hard_limit {
            return Err(ChannelError::message_too_large(format!(
                "payload of {} bytes exceeds the {} byte limit",
                payload.len(),
                self.config.hard_limit
            )));
        }

        let payload: Value = serde_json::from_str(payload)
            .map_err(|e| ChannelError::Unrecognized(anyhow::Error::new(e)))?;
        let body = json!({
            "methodName": self.config.method_name,
            "responseTimeoutInSeconds": timeout.as_secs(),
            "payload": payload,
        });

        let mut request = self
            .client
            .post(self.methods_url(device_id))
            .timeout(timeout.as_duration() + Duration::from_secs(5))
            .json(&body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(device_id, method = %self.config.method_name, timeout = timeout.as_secs(), "Invoking device method");

        let response = request.send().await.map_err(Self::transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let reply: MethodReply = response.json().await.map_err(|e| {
            if e.is_decode() {
                ChannelError::operation(format!("unreadable method reply: {e}"))
            } else {
                Self::transport_error(e)
            }
        })?;

        let content = serde_json::to_string(&reply.payload)
            .map_err(|e| ChannelError::Unrecognized(anyhow::Error::new(e)))?;

        Ok(InvocationResult {
            status: reply.status,
            content,
        })
    }

    fn max_message_size(&self) -> u64 {
        self.config.message_size_threshold
    }
}
