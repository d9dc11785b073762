//! relay-axum: HTTP front door for the cloud relay.
//!
//! Exposes `GET|PUT|POST|DELETE /api/v1/devices/{device_id}/request` and
//! hands each call to a [`relay_device::RelayOrchestrator`]. Failures are
//! answered as `application/problem+json`.

pub mod app;
pub mod params;
pub mod rest;
pub mod state;
mod error;
pub use error::RelayAxumError;
pub use state::RelayAxumState;

pub use app::{axum, RelayAxumApp};
