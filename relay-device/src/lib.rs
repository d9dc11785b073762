//! relay-device: the device half of the cloud relay.
//!
//! An inbound request becomes a [`RequestEnvelope`], travels over a
//! [`DeviceChannel`] as compact JSON, and comes back as a
//! [`ResponseEnvelope`] that the [`RelayOrchestrator`] turns into a
//! [`RelayResponse`]. Bodies too large for the channel are staged through
//! `relay-blob` in either direction.

mod channel;
pub mod codec;
mod envelope;
mod http_channel;
mod relay;
pub mod routing;

pub use channel::{
    ChannelError, ChannelResult, DeviceChannel, InvocationResult, ResponseTimeout,
    MAX_RESPONSE_TIMEOUT_SECS, MIN_RESPONSE_TIMEOUT_SECS,
};
pub use codec::{CodecError, CodecResult};
pub use envelope::{
    RelayMethod, RequestBody, RequestEnvelope, RequestHeaders, ResponseBody, ResponseEnvelope,
    ResponseHeaders, UnsupportedMethod, REMOTE_QUERY_HEADER,
};
pub use http_channel::{HttpChannelConfig, HttpMethodChannel, DEFAULT_HARD_LIMIT};
pub use relay::{
    InboundRequest, RelayBody, RelayOptions, RelayOrchestrator, RelayResponse, RelayState,
    DEFAULT_BLOB_CONTENT_TYPE,
};
pub use routing::Route;
