use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use relay_core::ProblemDetails;

#[derive(Debug)]
pub struct RelayAxumError(pub anyhow::Error);

impl From<anyhow::Error> for RelayAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for RelayAxumError {
    fn into_response(self) -> Response {
        // RelayError anywhere in the chain keeps its status and code; anything
        // else is a generic 500 with no internal detail.
        let problem = ProblemDetails::from_anyhow(&self.0);
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut res = (status, Json(problem.to_json())).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(ProblemDetails::CONTENT_TYPE),
        );
        res
    }
}
