use std::collections::HashMap;
use std::io;

use axum::{
    body::Body,
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::Response,
    routing, Router,
};
use futures::TryStreamExt;
use relay_core::RelayError;
use relay_device::{InboundRequest, RelayBody, RelayMethod, RelayResponse};
use tracing::{error, warn};

use crate::{params::RelayParams, RelayAxumError, RelayAxumState};

pub const DEVICE_REQUEST_PATH: &str = "/api/v1/devices/{device_id}/request";

const DEFAULT_TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub fn device_router(state: RelayAxumState) -> Router<()> {
    Router::new()
        .route(
            DEVICE_REQUEST_PATH,
            routing::get(relay_request)
                .put(relay_request)
                .post(relay_request)
                .delete(relay_request),
        )
        .with_state(state)
}

async fn relay_request(
    State(state): State<RelayAxumState>,
    Path(device_id): Path<String>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, RelayAxumError> {
    let result = async {
        let relay_method = method
            .as_str()
            .parse::<RelayMethod>()
            .map_err(|e| RelayError::invalid_argument(e.to_string()).into_anyhow())?;
        let params = RelayParams::from_parts(&headers, &query)?;

        let request = InboundRequest {
            method: relay_method,
            remote_path: params.remote_path,
            headers: params.headers,
            body: Box::pin(body.into_data_stream().map_err(io::Error::other)),
            response_timeout: params.response_timeout,
        };

        state.relay.relay(&device_id, request).await
    }
    .await;

    match result {
        Ok(response) => Ok(into_http_response(response)),
        Err(err) => {
            if RelayError::from_anyhow(&err).is_none() {
                error!(%method, %uri, error = ?err, "Unhandled relay failure");
            }
            Err(err.into())
        }
    }
}

fn into_http_response(response: RelayResponse) -> Response {
    let RelayResponse {
        status,
        content_type,
        content_length,
        headers,
        body,
    } = response;

    let content_type = match (&body, content_type) {
        (_, Some(content_type)) => Some(content_type),
        (RelayBody::Text(_), None) => Some(DEFAULT_TEXT_CONTENT_TYPE.to_string()),
        _ => None,
    };

    let mut res = Response::new(match body {
        RelayBody::Empty => Body::empty(),
        RelayBody::Text(text) => Body::from(text),
        RelayBody::Stream(stream) => Body::from_stream(stream),
    });
    *res.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);

    let out = res.headers_mut();
    if let Some(value) = content_type.and_then(|v| HeaderValue::from_str(&v).ok()) {
        out.insert(header::CONTENT_TYPE, value);
    }
    if let Some(length) = content_length {
        out.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping device header that is not valid HTTP"),
        }
    }

    res
}
