//! # Relay orchestrator
//!
//! One relay call walks `Building → Invoking → Decoding → Resolving`; any
//! step can fail, and the error carries the kind and code the HTTP edge
//! reports.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use relay_blob::{
    collect_stream, BlobError, BlobMetadata, BlobStagingService, BlobUpload, ByteStream,
};
use relay_core::{ErrorCode, RelayConfigSnapshot, RelayError, RelayResult};
use tracing::debug;

use crate::codec::{decode_response, encode_request, unwrap_stringified, CodecError};
use crate::routing::{route_for, Route};
use crate::{
    DeviceChannel, RelayMethod, RequestBody, RequestEnvelope, RequestHeaders, ResponseBody,
    ResponseEnvelope, ResponseTimeout,
};

pub const DEFAULT_BLOB_CONTENT_TYPE: &str = "application/octet-stream";

/// Settings fixed at orchestrator construction.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Used when the caller does not ask for a specific timeout.
    pub response_timeout: ResponseTimeout,
}

impl RelayOptions {
    pub fn from_snapshot(config: &RelayConfigSnapshot) -> Self {
        Self {
            response_timeout: config
                .get_i64("device.response_timeout")
                .map(ResponseTimeout::from_secs)
                .unwrap_or_default(),
        }
    }
}

/// What the HTTP layer hands over.
pub struct InboundRequest {
    pub method: RelayMethod,
    /// Device-side resource path.
    pub remote_path: String,
    pub headers: RequestHeaders,
    pub body: ByteStream,
    pub response_timeout: Option<ResponseTimeout>,
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("method", &self.method)
            .field("remote_path", &self.remote_path)
            .field("headers", &self.headers)
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}

pub enum RelayBody {
    Empty,
    Text(String),
    Stream(ByteStream),
}

impl fmt::Debug for RelayBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayBody::Empty => f.write_str("Empty"),
            RelayBody::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RelayBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// What the HTTP layer materializes.
#[derive(Debug)]
pub struct RelayResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Known only for blob-backed bodies.
    pub content_length: Option<u64>,
    pub headers: Vec<(String, String)>,
    pub body: RelayBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Building,
    Invoking,
    Decoding,
    Resolving,
    Done,
}

/// Drives one request through the device and back.
pub struct RelayOrchestrator {
    channel: Arc<dyn DeviceChannel>,
    staging: Arc<BlobStagingService>,
    options: RelayOptions,
}

impl RelayOrchestrator {
    pub fn new(
        channel: Arc<dyn DeviceChannel>,
        staging: Arc<BlobStagingService>,
        options: RelayOptions,
    ) -> Self {
        Self {
            channel,
            staging,
            options,
        }
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    pub async fn relay(&self, device_id: &str, request: InboundRequest) -> RelayResult<RelayResponse> {
        let timeout = request
            .response_timeout
            .unwrap_or(self.options.response_timeout);

        let envelope = self
            .step(device_id, RelayState::Building, self.build_request(device_id, request))
            .await?;
        let result = self
            .step(device_id, RelayState::Invoking, self.invoke(device_id, &envelope, timeout))
            .await?;
        let reply = self
            .step(device_id, RelayState::Decoding, async { Self::decode(&result) })
            .await?;
        let response = self
            .step(device_id, RelayState::Resolving, self.resolve(device_id, reply))
            .await?;

        debug!(device_id, state = ?RelayState::Done, status = response.status, "Relay completed");
        Ok(response)
    }

    async fn step<T, F>(&self, device_id: &str, state: RelayState, fut: F) -> RelayResult<T>
    where
        F: std::future::Future<Output = RelayResult<T>>,
    {
        debug!(device_id, state = ?state, "Relay step");
        fut.await.inspect_err(|err| {
            let kind = RelayError::from_anyhow(err).map(|e| e.kind.name()).unwrap_or("Unhandled");
            debug!(device_id, state = ?state, kind, "Relay failed");
        })
    }

    /// Turn the inbound request into an envelope, staging the body if needed.
    pub async fn build_request(
        &self,
        device_id: &str,
        request: InboundRequest,
    ) -> RelayResult<RequestEnvelope> {
        let InboundRequest {
            method,
            remote_path,
            headers,
            body,
            ..
        } = request;

        let body = match route_for(method, &headers, self.channel.max_message_size()) {
            Route::Empty => RequestBody::Empty,
            Route::Inline => {
                let bytes = collect_stream(body)
                    .await
                    .context("failed to read request body")?;
                let (text, _, _) = headers.encoding().decode(&bytes);
                RequestBody::Inline(text.into_owned())
            }
            Route::Staged => {
                let mut upload = BlobUpload::new(body);
                if let Some(content_type) = &headers.content_type {
                    upload = upload.with_content_type(content_type.clone());
                }
                if let Some(name) = headers.file_name() {
                    upload = upload.with_metadata(BlobMetadata::new().with_original_file_name(name));
                }

                let staged = self.staging.stage(device_id, upload).await.map_err(|err| {
                    RelayError::transient("Failed to stage request body")
                        .with_source(anyhow::Error::new(err))
                        .into_anyhow()
                })?;
                RequestBody::Blob(staged.url)
            }
        };

        Ok(RequestEnvelope {
            path: remote_path,
            method,
            headers,
            body,
        })
    }

    async fn invoke(
        &self,
        device_id: &str,
        envelope: &RequestEnvelope,
        timeout: ResponseTimeout,
    ) -> RelayResult<crate::InvocationResult> {
        let payload = encode_request(envelope).map_err(CodecError::into_anyhow)?;
        let result = self
            .channel
            .invoke(device_id, &payload, timeout)
            .await
            .map_err(|err| err.into_relay_error(device_id))?;

        debug!(device_id, channel_status = result.status, "Device answered");
        Ok(result)
    }

    fn decode(result: &crate::InvocationResult) -> RelayResult<ResponseEnvelope> {
        unwrap_stringified(&result.content)
            .and_then(|content| decode_response(&content))
            .map_err(CodecError::into_anyhow)
    }

    /// Materialize the reply, fetching the device's blob when it sent one.
    pub async fn resolve(
        &self,
        device_id: &str,
        reply: ResponseEnvelope,
    ) -> RelayResult<RelayResponse> {
        let status = reply.effective_status();
        let headers = reply
            .passthrough_headers()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();

        match reply.body {
            ResponseBody::Inline(text) => Ok(RelayResponse {
                status,
                content_type: reply.headers.content_type,
                content_length: None,
                headers,
                body: text.map_or(RelayBody::Empty, RelayBody::Text),
            }),
            ResponseBody::Blob(name) => {
                let opened = self
                    .staging
                    .fetch(device_id, &name)
                    .await
                    .map_err(|err| match err {
                        BlobError::NotFound { .. } => {
                            RelayError::id_not_found(ErrorCode::BlobNotFound, &name)
                                .with_source(anyhow::Error::new(err))
                                .into_anyhow()
                        }
                        other => other.into_anyhow(),
                    })?;

                let content_type = reply
                    .headers
                    .content_type
                    .or(opened.info.content_type)
                    .unwrap_or_else(|| DEFAULT_BLOB_CONTENT_TYPE.to_string());

                Ok(RelayResponse {
                    status,
                    content_type: Some(content_type),
                    content_length: Some(opened.info.length),
                    headers,
                    body: RelayBody::Stream(opened.stream),
                })
            }
        }
    }
}
