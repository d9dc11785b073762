//! # Errors
//!
//! The relay speaks a small, closed error taxonomy to its callers.
//! Core goals:
//! - every failure carries an HTTP status family ([`ErrorKind`]) and a
//!   numeric relay code ([`ErrorCode`])
//! - errors travel through `anyhow::Error` between crates
//! - the HTTP edge turns them into RFC 7807 problem documents
//!
//! Failures that are not a [`RelayError`] are "unhandled": the edge logs them
//! and answers with a generic 500 that leaks nothing.

use std::fmt;

use anyhow::Error as AnyError;
use serde::{Serialize, Serializer};

/// A convenience result type for relay APIs.
pub type RelayResult<T> = std::result::Result<T, AnyError>;

/// Detail returned for failures that were never translated.
pub const UNHANDLED_ERROR_DETAIL: &str = "An error occurred while executing the request";

/// HTTP status families used by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,   // 400
    NotFound,     // 404
    Conflict,     // 409
    GeneralError, // 500
    BadGateway,   // 502
    Unavailable,  // 503
    /// Retry-worthy failure while staging a blob (503).
    Transient,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::GeneralError => 500,
            ErrorKind::BadGateway => 502,
            ErrorKind::Unavailable | ErrorKind::Transient => 503,
        }
    }

    /// Standard reason phrase, used as the problem document `title`.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::GeneralError => "Internal Server Error",
            ErrorKind::BadGateway => "Bad Gateway",
            ErrorKind::Unavailable | ErrorKind::Transient => "Service Unavailable",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::BadGateway => "BadGateway",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Transient => "Transient",
        }
    }
}

/// Numeric codes surfaced as `errorCode` in problem documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    // request validation
    InvalidResponseTimeout = 100,
    MissingRemoteQuery = 101,
    InvalidArgument = 102,

    // device interaction
    DeviceNotFound = 1000,
    DeviceOperationError = 1001,
    InvalidResult = 1002,
    MessageTooLarge = 1003,

    // channel
    CommunicationError = 5000,
    GatewayError = 5001,
    QuotaExceeded = 5002,

    // blob storage
    BlobNotFound = 6000,
    BlobAlreadyExists = 6001,
    StagingFailed = 6002,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::InvalidResponseTimeout => "InvalidResponseTimeout",
            ErrorCode::MissingRemoteQuery => "MissingRemoteQuery",
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::DeviceNotFound => "DeviceNotFound",
            ErrorCode::DeviceOperationError => "DeviceOperationError",
            ErrorCode::InvalidResult => "InvalidResult",
            ErrorCode::MessageTooLarge => "MessageTooLarge",
            ErrorCode::CommunicationError => "CommunicationError",
            ErrorCode::GatewayError => "GatewayError",
            ErrorCode::QuotaExceeded => "QuotaExceeded",
            ErrorCode::BlobNotFound => "BlobNotFound",
            ErrorCode::BlobAlreadyExists => "BlobAlreadyExists",
            ErrorCode::StagingFailed => "StagingFailed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u32())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_u32())
    }
}

/// A structured relay error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct RelayError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    pub source: Option<AnyError>,
}

impl RelayError {
    pub fn new(kind: ErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Find a `RelayError` anywhere in the chain of an `anyhow::Error`.
    pub fn from_anyhow(err: &AnyError) -> Option<&RelayError> {
        err.chain().find_map(|cause| cause.downcast_ref::<RelayError>())
    }

    /// Copy without the inner `source`, safe to hand to a client.
    pub fn sanitize_for_client(&self) -> RelayError {
        RelayError {
            kind: self.kind,
            code: self.code,
            message: self.message.clone(),
            source: None,
        }
    }

    pub fn to_problem(&self) -> ProblemDetails {
        ProblemDetails {
            type_uri: ProblemDetails::DEFAULT_TYPE.to_string(),
            title: self.kind.reason_phrase().to_string(),
            status: self.status_code(),
            detail: self.message.clone(),
            error_code: Some(self.code),
        }
    }

    // ---- Constructors ----

    /// "Reference 'id' does not exist"
    pub fn id_not_found(code: ErrorCode, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::NotFound,
            code,
            format!("Reference '{id}' does not exist"),
        )
    }

    pub fn bad_request(code: ErrorCode) -> Self {
        Self::new(ErrorKind::BadRequest, code, "Invalid request")
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, ErrorCode::InvalidArgument, msg)
    }

    pub fn conflict(code: ErrorCode) -> Self {
        Self::new(
            ErrorKind::Conflict,
            code,
            "Entity has been updated by another request",
        )
    }

    pub fn communication(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, ErrorCode::CommunicationError, msg)
    }

    pub fn gateway() -> Self {
        Self::new(
            ErrorKind::Unavailable,
            ErrorCode::GatewayError,
            "Gateway error or device interaction disabled",
        )
    }

    pub fn quota_exceeded() -> Self {
        Self::new(
            ErrorKind::Unavailable,
            ErrorCode::QuotaExceeded,
            "Total number of messages exceeded the allocated quota",
        )
    }

    pub fn message_too_large() -> Self {
        Self::new(
            ErrorKind::BadGateway,
            ErrorCode::MessageTooLarge,
            "Message too large",
        )
    }

    pub fn invalid_result(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadGateway, ErrorCode::InvalidResult, msg)
    }

    pub fn operation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadGateway, ErrorCode::DeviceOperationError, msg)
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, ErrorCode::StagingFailed, msg)
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [{}]: {}",
            self.kind.name(),
            self.status_code(),
            self.code,
            self.message
        )
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// RFC 7807 problem document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl ProblemDetails {
    pub const DEFAULT_TYPE: &'static str = "about:blank";
    pub const CONTENT_TYPE: &'static str = "application/problem+json";

    /// Generic 500 for failures that are not a [`RelayError`].
    pub fn unhandled() -> Self {
        Self {
            type_uri: Self::DEFAULT_TYPE.to_string(),
            title: ErrorKind::GeneralError.reason_phrase().to_string(),
            status: ErrorKind::GeneralError.status_code(),
            detail: UNHANDLED_ERROR_DETAIL.to_string(),
            error_code: None,
        }
    }

    /// Problem document for any error: translated errors keep their
    /// kind and code, everything else becomes [`ProblemDetails::unhandled`].
    pub fn from_anyhow(err: &AnyError) -> Self {
        match RelayError::from_anyhow(err) {
            Some(relay) => relay.sanitize_for_client().to_problem(),
            None => Self::unhandled(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "type": self.type_uri,
                "title": self.title,
                "status": self.status,
                "detail": self.detail,
            })
        })
    }
}

/// Convenience helper for "bail with RelayError".
#[macro_export]
macro_rules! bail_relay {
    ($ctor:ident $(, $arg:expr)* $(,)?) => {
        return Err($crate::errors::RelayError::$ctor($($arg),*).into_anyhow());
    };
}
