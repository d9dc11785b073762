//! relay-core: error taxonomy and configuration shared by every relay crate.

pub mod config;
pub mod errors;

pub use config::{RelayConfig, RelayConfigSnapshot, ENV_PREFIX};
pub use errors::{ErrorCode, ErrorKind, ProblemDetails, RelayError, RelayResult};
