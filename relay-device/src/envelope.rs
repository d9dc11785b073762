//! Request and response envelopes exchanged with a device.

use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};

/// Header carrying the device-side resource path.
pub const REMOTE_QUERY_HEADER: &str = "Remote-Query";

/// HTTP methods the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl RelayMethod {
    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMethod::Get => "GET",
            RelayMethod::Put => "PUT",
            RelayMethod::Post => "POST",
            RelayMethod::Delete => "DELETE",
        }
    }

    /// GET and DELETE never carry a body.
    pub fn carries_body(&self) -> bool {
        matches!(self, RelayMethod::Put | RelayMethod::Post)
    }
}

impl fmt::Display for RelayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedMethod(pub String);

impl fmt::Display for UnsupportedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported method '{}'", self.0)
    }
}

impl std::error::Error for UnsupportedMethod {}

impl FromStr for RelayMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(RelayMethod::Get),
            "PUT" => Ok(RelayMethod::Put),
            "POST" => Ok(RelayMethod::Post),
            "DELETE" => Ok(RelayMethod::Delete),
            _ => Err(UnsupportedMethod(s.to_string())),
        }
    }
}

/// The fixed header subset forwarded to the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeaders {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

impl RequestHeaders {
    /// Charset declared by the content type; UTF-8 when absent or unknown.
    pub fn encoding(&self) -> &'static Encoding {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .and_then(|m| {
                m.get_param(mime::CHARSET)
                    .and_then(|charset| Encoding::for_label(charset.as_str().as_bytes()))
            })
            .unwrap_or(UTF_8)
    }

    /// True for `multipart/form-data`, whatever the parameters.
    pub fn is_multipart_form(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .is_some_and(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
    }

    /// File name from `Content-Disposition`, preferring `filename*`.
    pub fn file_name(&self) -> Option<String> {
        self.content_disposition
            .as_deref()
            .and_then(file_name_from_disposition)
    }
}

fn file_name_from_disposition(disposition: &str) -> Option<String> {
    let mut plain = None;
    for param in disposition.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case("filename*") {
            // RFC 5987: charset'lang'percent-encoded
            let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        } else if key.eq_ignore_ascii_case("filename") {
            let unquoted = value.trim_matches('"');
            if !unquoted.is_empty() {
                plain = Some(unquoted.to_string());
            }
        }
    }
    plain
}

/// Outbound body: exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Inline(String),
    /// Delegated read URL of a staged blob.
    Blob(String),
}

/// One unit of work sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub path: String,
    pub method: RelayMethod,
    pub headers: RequestHeaders,
    pub body: RequestBody,
}

/// Headers echoed back by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    /// Legacy location of the status code.
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Text as returned to the caller; `None` means no body.
    Inline(Option<String>),
    /// Device-relative name of a blob the device uploaded.
    Blob(String),
}

/// The device reply, normalized from either wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: Option<u16>,
    pub headers: ResponseHeaders,
    pub body: ResponseBody,
}

impl ResponseEnvelope {
    pub const DEFAULT_STATUS: u16 = 200;

    /// Top-level status, else the legacy nested one, else 200.
    pub fn effective_status(&self) -> u16 {
        self.status
            .or(self.headers.status)
            .unwrap_or(Self::DEFAULT_STATUS)
    }

    /// Headers copied verbatim onto the HTTP response. Status and content
    /// type travel separately.
    pub fn passthrough_headers(&self) -> Vec<(&'static str, String)> {
        self.headers
            .content_disposition
            .iter()
            .filter(|value| !value.is_empty())
            .map(|value| ("Content-Disposition", value.clone()))
            .collect()
    }
}
