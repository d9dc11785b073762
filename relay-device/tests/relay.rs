use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_blob::{
    collect_stream, stream_from_bytes, BlobError, BlobInfo, BlobRepository, BlobResult,
    BlobStagingService, BlobUpload, MemoryBlobRepository, OpenedBlob, StagingConfig,
};
use relay_core::{ErrorCode, ErrorKind, RelayError};
use relay_device::{
    ChannelError, ChannelResult, DeviceChannel, InboundRequest, InvocationResult, RelayBody,
    RelayMethod, RelayOptions, RelayOrchestrator, RequestHeaders, ResponseTimeout,
};
use serde_json::Value;

/// Channel double: records what it was sent and answers with a canned reply.
struct StubChannel {
    reply: Result<String, fn() -> ChannelError>,
    max_message_size: u64,
    calls: Mutex<Vec<(String, String, ResponseTimeout)>>,
}

impl StubChannel {
    fn replying(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            max_message_size: 1024,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(err: fn() -> ChannelError) -> Self {
        Self {
            reply: Err(err),
            max_message_size: 1024,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn last_payload(&self) -> Value {
        let calls = self.calls.lock();
        let (_, payload, _) = calls.last().expect("channel was not invoked");
        serde_json::from_str(payload).unwrap()
    }
}

#[async_trait]
impl DeviceChannel for StubChannel {
    async fn invoke(
        &self,
        device_id: &str,
        payload: &str,
        timeout: ResponseTimeout,
    ) -> ChannelResult<InvocationResult> {
        self.calls
            .lock()
            .push((device_id.to_string(), payload.to_string(), timeout));
        match &self.reply {
            Ok(content) => Ok(InvocationResult {
                status: 200,
                content: content.clone(),
            }),
            Err(make) => Err(make()),
        }
    }

    fn max_message_size(&self) -> u64 {
        self.max_message_size
    }
}

struct Harness {
    channel: Arc<StubChannel>,
    repo: MemoryBlobRepository,
    relay: RelayOrchestrator,
}

fn harness(channel: StubChannel) -> Harness {
    let channel = Arc::new(channel);
    let repo = MemoryBlobRepository::new();
    let staging = Arc::new(BlobStagingService::new(repo.clone(), StagingConfig::default()));
    let relay = RelayOrchestrator::new(channel.clone(), staging, RelayOptions::default());
    Harness {
        channel,
        repo,
        relay,
    }
}

fn request(method: RelayMethod, headers: RequestHeaders, body: &'static [u8]) -> InboundRequest {
    InboundRequest {
        method,
        remote_path: "/api/status".to_string(),
        headers,
        body: stream_from_bytes(body),
        response_timeout: None,
    }
}

fn json_headers(length: u64) -> RequestHeaders {
    RequestHeaders {
        content_type: Some("application/json".to_string()),
        content_length: Some(length),
        ..RequestHeaders::default()
    }
}

fn relay_error(err: &anyhow::Error) -> &RelayError {
    RelayError::from_anyhow(err).expect("expected a relay error")
}

#[tokio::test]
async fn get_and_delete_discard_any_body() {
    for method in [RelayMethod::Get, RelayMethod::Delete] {
        let h = harness(StubChannel::replying(r#"{"status":204}"#));
        let response = h
            .relay
            .relay("dev-1", request(method, json_headers(9), b"{\"a\":1}"))
            .await
            .unwrap();

        assert_eq!(response.status, 204);
        let payload = h.channel.last_payload();
        assert!(payload.get("body").is_none(), "{method}");
        assert!(payload.get("blobUrl").is_none(), "{method}");
        assert!(h.repo.is_empty());
    }
}

#[tokio::test]
async fn small_bodies_are_inlined_verbatim() {
    let h = harness(StubChannel::replying(r#"{"status":201,"body":{"id":7}}"#));
    let response = h
        .relay
        .relay("dev-1", request(RelayMethod::Post, json_headers(7), b"{\"a\":1}"))
        .await
        .unwrap();

    let payload = h.channel.last_payload();
    assert_eq!(payload["path"], "/api/status");
    assert_eq!(payload["method"], "POST");
    assert_eq!(payload["body"], "{\"a\":1}");
    assert_eq!(payload["headers"]["contentType"], "application/json");

    assert_eq!(response.status, 201);
    match response.body {
        RelayBody::Text(text) => assert_eq!(text, r#"{"id":7}"#),
        other => panic!("unexpected body {other:?}"),
    }
}

#[tokio::test]
async fn declared_charset_is_used_to_read_inline_bodies() {
    let h = harness(StubChannel::replying(r#"{}"#));
    let headers = RequestHeaders {
        content_type: Some("text/plain; charset=iso-8859-1".to_string()),
        content_length: Some(4),
        ..RequestHeaders::default()
    };

    h.relay
        .relay("dev-1", request(RelayMethod::Put, headers, b"caf\xe9"))
        .await
        .unwrap();

    assert_eq!(h.channel.last_payload()["body"], "café");
}

#[tokio::test]
async fn oversized_bodies_are_staged_not_inlined() {
    let h = harness(StubChannel::replying(r#"{"status":202}"#));
    let headers = RequestHeaders {
        content_type: Some("application/octet-stream".to_string()),
        content_disposition: Some("attachment; filename=\"dump.bin\"".to_string()),
        content_length: Some(4096),
        ..RequestHeaders::default()
    };

    let response = h
        .relay
        .relay("dev-1", request(RelayMethod::Post, headers, b"large payload"))
        .await
        .unwrap();
    assert_eq!(response.status, 202);

    let payload = h.channel.last_payload();
    assert!(payload.get("body").is_none());
    let url = payload["blobUrl"].as_str().unwrap();
    assert!(url.starts_with("memory://blobs/server-uploads/dev-1/RestApi/"));

    let path = url
        .trim_start_matches("memory://blobs/")
        .split('?')
        .next()
        .unwrap();
    assert_eq!(h.repo.bytes(path).unwrap().as_ref(), b"large payload");

    let info = relay_blob::BlobRepository::get_info(&h.repo, path)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.metadata.original_file_name(), Some("dump.bin"));
    assert_eq!(info.content_type.as_deref(), Some("application/octet-stream"));
}

#[tokio::test]
async fn multipart_bodies_are_staged_regardless_of_size() {
    let h = harness(StubChannel::replying(r#"{}"#));
    let headers = RequestHeaders {
        content_type: Some("multipart/form-data; boundary=xyz".to_string()),
        content_length: Some(12),
        ..RequestHeaders::default()
    };

    h.relay
        .relay("dev-1", request(RelayMethod::Put, headers, b"--xyz--\r\n"))
        .await
        .unwrap();

    assert!(h.channel.last_payload()["blobUrl"].is_string());
    assert_eq!(h.repo.len(), 1);
}

#[tokio::test]
async fn blob_replies_stream_the_device_upload() {
    let h = harness(StubChannel::replying(
        r#"{"status":200,"headers":{"contentDisposition":"attachment; filename=report.csv"},"BlobUrl":"report.csv"}"#,
    ));
    h.repo.insert_with_last_modified(
        "device-uploads/dev-1/report.csv",
        "a,b\n1,2\n",
        Some("text/csv"),
        chrono::Utc::now(),
    );

    let response = h
        .relay
        .relay("dev-1", request(RelayMethod::Get, RequestHeaders::default(), b""))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("text/csv"));
    assert_eq!(response.content_length, Some(8));
    assert_eq!(
        response.headers,
        vec![(
            "Content-Disposition".to_string(),
            "attachment; filename=report.csv".to_string()
        )]
    );
    match response.body {
        RelayBody::Stream(stream) => {
            assert_eq!(collect_stream(stream).await.unwrap().as_ref(), b"a,b\n1,2\n");
        }
        other => panic!("unexpected body {other:?}"),
    }
}

#[tokio::test]
async fn missing_device_blob_is_not_found() {
    let h = harness(StubChannel::replying(r#"{"blobUrl":"gone.bin"}"#));
    let err = h
        .relay
        .relay("dev-1", request(RelayMethod::Get, RequestHeaders::default(), b""))
        .await
        .unwrap_err();

    let relay = relay_error(&err);
    assert_eq!(relay.kind, ErrorKind::NotFound);
    assert_eq!(relay.code, ErrorCode::BlobNotFound);
}

#[tokio::test]
async fn unknown_device_maps_to_not_found_with_its_id() {
    let h = harness(StubChannel::failing(|| ChannelError::DeviceNotFound));
    let err = h
        .relay
        .relay("X", request(RelayMethod::Get, RequestHeaders::default(), b""))
        .await
        .unwrap_err();

    let relay = relay_error(&err);
    assert_eq!(relay.status_code(), 404);
    assert_eq!(relay.code, ErrorCode::DeviceNotFound);
    assert_eq!(relay.message, "Reference 'X' does not exist");
}

#[tokio::test]
async fn unreadable_replies_are_invalid_results() {
    let h = harness(StubChannel::replying("<html>oops</html>"));
    let err = h
        .relay
        .relay("dev-1", request(RelayMethod::Get, RequestHeaders::default(), b""))
        .await
        .unwrap_err();

    let relay = relay_error(&err);
    assert_eq!(relay.status_code(), 502);
    assert_eq!(relay.code, ErrorCode::InvalidResult);
}

#[tokio::test]
async fn stringified_legacy_replies_default_to_ok() {
    let legacy = serde_json::to_string(r#"{"headers":{},"body":"plain"}"#).unwrap();
    let h = harness(StubChannel::replying(&legacy));
    let response = h
        .relay
        .relay("dev-1", request(RelayMethod::Get, RequestHeaders::default(), b""))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(response.headers.is_empty());
    match response.body {
        RelayBody::Text(text) => assert_eq!(text, "plain"),
        other => panic!("unexpected body {other:?}"),
    }
}

#[tokio::test]
async fn requested_timeout_is_clamped_before_invoking() {
    let h = harness(StubChannel::replying("{}"));
    let mut inbound = request(RelayMethod::Get, RequestHeaders::default(), b"");
    inbound.response_timeout = Some(ResponseTimeout::from_secs(1));
    h.relay.relay("dev-1", inbound).await.unwrap();

    let default_call = request(RelayMethod::Get, RequestHeaders::default(), b"");
    h.relay.relay("dev-1", default_call).await.unwrap();

    let calls = h.channel.calls.lock();
    assert_eq!(calls[0].2.as_secs(), 5);
    assert_eq!(calls[1].2.as_secs(), 30);
}

/// Every write lands on a path that already exists.
struct CollidingRepository;

#[async_trait]
impl BlobRepository for CollidingRepository {
    async fn get_info(&self, _path: &str) -> BlobResult<Option<BlobInfo>> {
        Ok(None)
    }
    async fn list(&self, _prefix: &str) -> BlobResult<Vec<BlobInfo>> {
        Ok(Vec::new())
    }
    async fn open(&self, path: &str) -> BlobResult<OpenedBlob> {
        Err(BlobError::not_found(path))
    }
    async fn write(&self, path: &str, _upload: BlobUpload, _overwrite: bool) -> BlobResult<()> {
        Err(BlobError::conflict(path))
    }
    async fn delete(&self, _path: &str) -> BlobResult<bool> {
        Ok(false)
    }
    async fn delegated_read_url(&self, path: &str, _ttl: Duration) -> BlobResult<String> {
        Err(BlobError::not_found(path))
    }
}

#[tokio::test]
async fn staging_failure_while_building_is_transient_and_skips_the_device() {
    let channel = Arc::new(StubChannel::replying(r#"{"status":200}"#));
    let staging = Arc::new(BlobStagingService::new(
        CollidingRepository,
        StagingConfig::default(),
    ));
    let relay = RelayOrchestrator::new(channel.clone(), staging, RelayOptions::default());

    let headers = RequestHeaders {
        content_type: Some("application/octet-stream".to_string()),
        content_length: Some(4096),
        ..RequestHeaders::default()
    };
    let err = relay
        .relay("dev-1", request(RelayMethod::Post, headers, b"large payload"))
        .await
        .unwrap_err();

    let relay_err = relay_error(&err);
    assert_eq!(relay_err.kind, ErrorKind::Transient);
    assert_eq!(relay_err.status_code(), 503);
    assert_eq!(relay_err.code, ErrorCode::StagingFailed);
    assert!(channel.calls.lock().is_empty());
}
