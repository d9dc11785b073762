//! # Envelope codec
//!
//! Outbound envelopes are written as compact JSON:
//!
//! ```json
//! {"path":"/status","method":"POST","headers":{"contentType":"application/json"},"body":"{}"}
//! ```
//!
//! Replies come in two historical shapes which decode to the same
//! [`ResponseEnvelope`]:
//!
//! - legacy: `{"headers":{"status":400},"body":"text"}`
//! - current: `{"status":400,"headers":{...},"body":<any JSON>}`
//!
//! A `blobUrl` field at top level, in any case, selects the blob variant and
//! wins over `body`. Field names are matched case-insensitively with `-` and
//! `_` ignored, so `Content-Type` and `contentType` are the same key.

use relay_core::RelayError;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{RequestBody, RequestEnvelope, RequestHeaders, ResponseBody, ResponseEnvelope, ResponseHeaders};

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Error, Debug)]
pub enum CodecError {
    /// The device reply cannot populate a response envelope.
    #[error("Invalid result: {reason}")]
    InvalidResult { reason: String },

    #[error("Failed to encode request envelope: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

impl CodecError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidResult {
            reason: reason.into(),
        }
    }

    /// `InvalidResult` becomes a 502 with a fixed detail; the parser error
    /// never reaches the caller.
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            CodecError::InvalidResult { .. } => RelayError::invalid_result("Invalid result")
                .with_source(anyhow::Error::new(self))
                .into_anyhow(),
            other => anyhow::Error::new(other),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    path: &'a str,
    method: &'a str,
    headers: &'a RequestHeaders,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blob_url: Option<&'a str>,
}

pub fn encode_request(envelope: &RequestEnvelope) -> CodecResult<String> {
    let (body, blob_url) = match &envelope.body {
        RequestBody::Empty => (None, None),
        RequestBody::Inline(text) => (Some(text.as_str()), None),
        RequestBody::Blob(url) => (None, Some(url.as_str())),
    };

    serde_json::to_string(&WireRequest {
        path: &envelope.path,
        method: envelope.method.as_str(),
        headers: &envelope.headers,
        body,
        blob_url,
    })
    .map_err(|source| CodecError::Encode { source })
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Look up a field by normalized name.
fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object
        .iter()
        .find(|(key, _)| normalize_key(key) == name)
        .map(|(_, value)| value)
}

fn status_of(value: Option<&Value>, name: &str) -> CodecResult<Option<u16>> {
    let status = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };

    match status {
        Some(code @ 100..=599) => Ok(Some(code as u16)),
        _ => Err(CodecError::invalid(format!("'{name}' is not an HTTP status"))),
    }
}

fn string_of(value: Option<&Value>, name: &str) -> CodecResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CodecError::invalid(format!("'{name}' must be a string"))),
    }
}

fn headers_of(value: Option<&Value>) -> CodecResult<ResponseHeaders> {
    let headers = match value {
        None | Some(Value::Null) => return Ok(ResponseHeaders::default()),
        Some(Value::Object(headers)) => headers,
        Some(_) => return Err(CodecError::invalid("'headers' must be an object")),
    };

    Ok(ResponseHeaders {
        status: status_of(field(headers, "status"), "headers.status")?,
        content_type: string_of(field(headers, "contenttype"), "headers.contentType")?,
        content_disposition: string_of(
            field(headers, "contentdisposition"),
            "headers.contentDisposition",
        )?,
    })
}

/// Inline bodies: strings pass through raw, other JSON is re-serialized
/// compact.
fn inline_body_of(value: Option<&Value>) -> CodecResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => serde_json::to_string(other)
            .map(Some)
            .map_err(|e| CodecError::invalid(e.to_string())),
    }
}

pub fn decode_response(content: &str) -> CodecResult<ResponseEnvelope> {
    let document: Value = serde_json::from_str(content)
        .map_err(|e| CodecError::invalid(format!("malformed reply: {e}")))?;
    let Value::Object(reply) = document else {
        return Err(CodecError::invalid("reply is not a JSON object"));
    };

    let status = status_of(field(&reply, "status"), "status")?;
    let headers = headers_of(field(&reply, "headers"))?;

    let has_blob = reply.keys().any(|key| normalize_key(key) == "bloburl");
    let body = if has_blob {
        match string_of(field(&reply, "bloburl"), "blobUrl")? {
            Some(name) if !name.is_empty() => ResponseBody::Blob(name),
            _ => return Err(CodecError::invalid("'blobUrl' must be a non-empty string")),
        }
    } else {
        ResponseBody::Inline(inline_body_of(field(&reply, "body"))?)
    };

    Ok(ResponseEnvelope {
        status,
        headers,
        body,
    })
}

/// Some channels return the reply JSON itself as a JSON string; unwrap one
/// level of quoting.
pub fn unwrap_stringified(payload: &str) -> CodecResult<String> {
    if payload.trim_start().starts_with('"') {
        serde_json::from_str::<String>(payload)
            .map_err(|e| CodecError::invalid(format!("malformed string payload: {e}")))
    } else {
        Ok(payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelayMethod;
    use relay_core::ErrorCode;

    fn request(body: RequestBody) -> RequestEnvelope {
        RequestEnvelope {
            path: "/api/points?id=1".to_string(),
            method: RelayMethod::Post,
            headers: RequestHeaders {
                accept: Some("application/json, text/plain".to_string()),
                content_type: Some("application/json".to_string()),
                content_disposition: None,
                content_length: Some(2),
            },
            body,
        }
    }

    #[test]
    fn inline_request_encodes_compact_camel_case() {
        let json = encode_request(&request(RequestBody::Inline("{}".to_string()))).unwrap();
        assert_eq!(
            json,
            r#"{"path":"/api/points?id=1","method":"POST","headers":{"accept":"application/json, text/plain","contentType":"application/json","contentLength":2},"body":"{}"}"#
        );
    }

    #[test]
    fn blob_request_carries_url_instead_of_body() {
        let json = encode_request(&request(RequestBody::Blob("https://store/x?sig".to_string())))
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["blobUrl"], "https://store/x?sig");
        assert!(value.get("body").is_none());
    }

    #[test]
    fn empty_request_has_neither_body_nor_blob() {
        let mut envelope = request(RequestBody::Empty);
        envelope.method = RelayMethod::Get;
        envelope.headers = RequestHeaders::default();
        let json = encode_request(&envelope).unwrap();
        assert_eq!(json, r#"{"path":"/api/points?id=1","method":"GET","headers":{}}"#);
    }

    #[test]
    fn legacy_and_current_shapes_decode_equivalently() {
        let legacy = decode_response(
            r#"{"headers":{"status":400,"Content-Type":"application/json"},"body":"{\"error\":\"bad\"}"}"#,
        )
        .unwrap();
        let current = decode_response(
            r#"{"status":400,"headers":{"contentType":"application/json"},"body":{"error":"bad"}}"#,
        )
        .unwrap();

        assert_eq!(legacy.effective_status(), current.effective_status());
        assert_eq!(legacy.body, current.body);
        assert_eq!(legacy.headers.content_type, current.headers.content_type);
        assert_eq!(
            current.body,
            ResponseBody::Inline(Some(r#"{"error":"bad"}"#.to_string()))
        );
    }

    #[test]
    fn blob_url_is_detected_in_any_case() {
        for key in ["blobUrl", "BlobUrl", "BLOBURL", "bloburl"] {
            let reply = format!(r#"{{"status":200,"{key}":"export.csv"}}"#);
            let decoded = decode_response(&reply).unwrap();
            assert_eq!(decoded.body, ResponseBody::Blob("export.csv".to_string()), "{key}");
        }
    }

    #[test]
    fn blob_wins_when_both_body_and_blob_url_are_present() {
        let decoded =
            decode_response(r#"{"body":"inline text","blobUrl":"reply.bin"}"#).unwrap();
        assert_eq!(decoded.body, ResponseBody::Blob("reply.bin".to_string()));
    }

    #[test]
    fn missing_status_and_body_decode_to_defaults() {
        let decoded = decode_response(r#"{"headers":null}"#).unwrap();
        assert_eq!(decoded.effective_status(), 200);
        assert_eq!(decoded.body, ResponseBody::Inline(None));
    }

    #[test]
    fn malformed_replies_are_invalid_results() {
        for reply in [
            "not json",
            "[1,2,3]",
            r#"{"status":"teapot"}"#,
            r#"{"status":1200}"#,
            r#"{"headers":"oops"}"#,
            r#"{"blobUrl":42}"#,
            r#"{"headers":{"contentType":5}}"#,
        ] {
            let err = decode_response(reply).unwrap_err();
            assert!(matches!(err, CodecError::InvalidResult { .. }), "{reply}");
        }
    }

    #[test]
    fn invalid_result_surfaces_as_fixed_502() {
        let err = decode_response("{").unwrap_err().into_anyhow();
        let relay = RelayError::from_anyhow(&err).unwrap();
        assert_eq!(relay.status_code(), 502);
        assert_eq!(relay.code, ErrorCode::InvalidResult);
        assert_eq!(relay.message, "Invalid result");
    }

    #[test]
    fn stringified_payloads_are_unwrapped_once() {
        let wrapped = serde_json::to_string(r#"{"status":200}"#).unwrap();
        assert_eq!(unwrap_stringified(&wrapped).unwrap(), r#"{"status":200}"#);
        assert_eq!(unwrap_stringified(r#"{"a":1}"#).unwrap(), r#"{"a":1}"#);
        assert!(unwrap_stringified("\"unterminated").is_err());
    }
}
