use crate::{RelayMethod, RequestHeaders};

/// Where an inbound body goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// GET/DELETE: any body is dropped.
    Empty,
    /// Read as text and embedded in the envelope.
    Inline,
    /// Written to the blob store; only its URL is sent.
    Staged,
}

/// Pick the route for a request body.
///
/// Compares the declared content length, not the final envelope size,
/// against `max_message_size`.
pub fn route_for(method: RelayMethod, headers: &RequestHeaders, max_message_size: u64) -> Route {
    if !method.carries_body() {
        return Route::Empty;
    }

    let oversized = headers
        .content_length
        .is_some_and(|length| length > max_message_size);

    if headers.is_multipart_form() || oversized {
        Route::Staged
    } else {
        Route::Inline
    }
}
