use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use relay_core::{bail_relay, ErrorCode, ErrorKind, RelayError, RelayResult};
use relay_device::{RequestHeaders, ResponseTimeout, REMOTE_QUERY_HEADER};

pub const RESPONSE_TIMEOUT_PARAM: &str = "responseTimeout";

/// Everything the relay needs from the inbound request apart from its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayParams {
    pub remote_path: String,
    pub headers: RequestHeaders,
    pub response_timeout: Option<ResponseTimeout>,
}

impl RelayParams {
    pub fn from_parts(headers: &HeaderMap, query: &HashMap<String, String>) -> RelayResult<Self> {
        Ok(Self {
            remote_path: remote_query(headers)?,
            headers: request_headers(headers),
            response_timeout: response_timeout(query)?,
        })
    }
}

/// The device-side path. Required and non-blank; UTF-8 bytes are accepted.
pub fn remote_query(headers: &HeaderMap) -> RelayResult<String> {
    let Some(raw) = headers.get(REMOTE_QUERY_HEADER) else {
        bail_relay!(
            new,
            ErrorKind::BadRequest,
            ErrorCode::MissingRemoteQuery,
            format!("The '{REMOTE_QUERY_HEADER}' header is required"),
        );
    };
    let Ok(value) = std::str::from_utf8(raw.as_bytes()) else {
        bail_relay!(
            invalid_argument,
            format!("The '{REMOTE_QUERY_HEADER}' header is not valid UTF-8"),
        );
    };

    let value = value.trim();
    if value.is_empty() {
        bail_relay!(
            new,
            ErrorKind::BadRequest,
            ErrorCode::MissingRemoteQuery,
            format!("The '{REMOTE_QUERY_HEADER}' header is required"),
        );
    }
    Ok(value.to_string())
}

/// Query lookup ignores the parameter's case. Out-of-range values are
/// clamped later; only non-integers are refused.
pub fn response_timeout(query: &HashMap<String, String>) -> RelayResult<Option<ResponseTimeout>> {
    let Some((_, raw)) = query
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(RESPONSE_TIMEOUT_PARAM))
    else {
        return Ok(None);
    };

    raw.trim()
        .parse::<i64>()
        .map(|secs| Some(ResponseTimeout::from_secs(secs)))
        .map_err(|_| {
            RelayError::new(
                ErrorKind::BadRequest,
                ErrorCode::InvalidResponseTimeout,
                format!("'{RESPONSE_TIMEOUT_PARAM}' must be a whole number of seconds"),
            )
            .into_anyhow()
        })
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn request_headers(headers: &HeaderMap) -> RequestHeaders {
    let accept: Vec<&str> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    RequestHeaders {
        accept: (!accept.is_empty()).then(|| accept.join(", ")),
        content_type: header_string(headers, header::CONTENT_TYPE),
        content_disposition: header_string(headers, header::CONTENT_DISPOSITION),
        content_length: headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()),
    }
}
