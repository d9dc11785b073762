//! Device command channel port.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{ErrorCode, RelayError};
use thiserror::Error;
use tracing::warn;

pub const MIN_RESPONSE_TIMEOUT_SECS: u64 = 5;
pub const MAX_RESPONSE_TIMEOUT_SECS: u64 = 300;

/// How long one invocation may wait for the device, clamped to 5..=300 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseTimeout(Duration);

impl ResponseTimeout {
    /// Out-of-range values are clamped, never rejected.
    pub fn from_secs(secs: i64) -> Self {
        let clamped = secs.clamp(
            MIN_RESPONSE_TIMEOUT_SECS as i64,
            MAX_RESPONSE_TIMEOUT_SECS as i64,
        );
        Self(Duration::from_secs(clamped as u64))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl Default for ResponseTimeout {
    fn default() -> Self {
        Self::from_secs(30)
    }
}

/// Raw outcome of one invocation, before envelope decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status: i32,
    pub content: String,
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Failures a channel implementation reports.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Device not found")]
    DeviceNotFound,

    /// The channel itself could not be reached.
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// The channel backend failed server-side.
    #[error("Channel server error: {message}")]
    ServerError { message: String },

    #[error("Message quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// Payload above the channel's hard limit.
    #[error("Message too large: {message}")]
    MessageTooLarge { message: String },

    /// Any other channel-specific failure, timeouts included.
    #[error("Device operation failed: {message}")]
    Operation { message: String },

    /// Not a channel failure at all; left untranslated.
    #[error(transparent)]
    Unrecognized(#[from] anyhow::Error),
}

impl ChannelError {
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }

    pub fn message_too_large(message: impl Into<String>) -> Self {
        Self::MessageTooLarge {
            message: message.into(),
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    /// Translate into the relay taxonomy. `Unrecognized` passes through
    /// untouched.
    pub fn into_relay_error(self, device_id: &str) -> anyhow::Error {
        match self.translate(device_id) {
            Some(translated) => translated.with_source(anyhow::Error::new(self)).into_anyhow(),
            None => match self {
                ChannelError::Unrecognized(inner) => inner,
                other => anyhow::Error::new(other),
            },
        }
    }

    /// Ordered mapping table.
    fn translate(&self, device_id: &str) -> Option<RelayError> {
        let translated = match self {
            ChannelError::DeviceNotFound => {
                RelayError::id_not_found(ErrorCode::DeviceNotFound, device_id)
            }
            ChannelError::Communication { message } => {
                warn!(device_id, error = %message, "Device channel unreachable");
                RelayError::communication(message.clone())
            }
            ChannelError::ServerError { message } => {
                warn!(device_id, error = %message, "Device channel server error");
                RelayError::gateway()
            }
            ChannelError::QuotaExceeded { .. } => RelayError::quota_exceeded(),
            ChannelError::MessageTooLarge { .. } => RelayError::message_too_large(),
            ChannelError::Operation { message } => {
                warn!(device_id, error = %message, "Device operation failed");
                RelayError::operation("Operation error or timeout")
            }
            ChannelError::Unrecognized(_) => return None,
        };
        Some(translated)
    }
}

/// Asynchronous invocation of one named operation on a device.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Send `payload` to `device_id` and wait up to `timeout` for the reply.
    async fn invoke(
        &self,
        device_id: &str,
        payload: &str,
        timeout: ResponseTimeout,
    ) -> ChannelResult<InvocationResult>;

    /// Advertised size, in bytes, above which bodies are staged.
    fn max_message_size(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ErrorKind;

    #[test]
    fn timeouts_are_clamped_not_rejected() {
        assert_eq!(ResponseTimeout::from_secs(1), ResponseTimeout::from_secs(5));
        assert_eq!(ResponseTimeout::from_secs(-20).as_secs(), 5);
        assert_eq!(ResponseTimeout::from_secs(42).as_secs(), 42);
        assert_eq!(ResponseTimeout::from_secs(10_000).as_secs(), 300);
        assert_eq!(ResponseTimeout::default().as_secs(), 30);
    }

    fn translated(err: ChannelError, device_id: &str) -> (ErrorKind, ErrorCode, String) {
        let err = err.into_relay_error(device_id);
        let relay = RelayError::from_anyhow(&err).unwrap();
        (relay.kind, relay.code, relay.message.clone())
    }

    #[test]
    fn device_not_found_names_the_device() {
        let (kind, code, message) = translated(ChannelError::DeviceNotFound, "X");
        assert_eq!(kind, ErrorKind::NotFound);
        assert_eq!(code, ErrorCode::DeviceNotFound);
        assert_eq!(message, "Reference 'X' does not exist");
    }

    #[test]
    fn communication_failures_never_become_operation_errors() {
        let (kind, code, message) = translated(ChannelError::communication("dns failure"), "X");
        assert_eq!(kind, ErrorKind::Unavailable);
        assert_eq!(code, ErrorCode::CommunicationError);
        assert_eq!(message, "dns failure");
    }

    #[test]
    fn mapping_table_is_deterministic() {
        let cases = [
            (ChannelError::server_error("500"), 503, ErrorCode::GatewayError),
            (ChannelError::quota_exceeded("429"), 503, ErrorCode::QuotaExceeded),
            (ChannelError::message_too_large("413"), 502, ErrorCode::MessageTooLarge),
            (ChannelError::operation("timeout"), 502, ErrorCode::DeviceOperationError),
        ];
        for (err, status, code) in cases {
            let err = err.into_relay_error("dev");
            let relay = RelayError::from_anyhow(&err).unwrap();
            assert_eq!((relay.status_code(), relay.code), (status, code));
        }
    }

    #[test]
    fn unrecognized_errors_stay_untranslated() {
        let err = ChannelError::Unrecognized(anyhow::anyhow!("null pointer")).into_relay_error("X");
        assert!(RelayError::from_anyhow(&err).is_none());
        assert_eq!(err.to_string(), "null pointer");
    }
}
