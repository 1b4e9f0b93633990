//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quickdocker_core::Error;
use serde::Serialize;

/// Handler error rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::ActionFailed(_) | Error::Bridge(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message without the variant prefix.
    #[must_use]
    pub fn detail(&self) -> String {
        match &self.0 {
            Error::NotFound(msg)
            | Error::RuntimeUnavailable(msg)
            | Error::InvalidRequest(msg)
            | Error::ActionFailed(msg) => msg.clone(),
            Error::Bridge(e) => e.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            tracing::error!(%status, detail, "Request failed");
        } else {
            tracing::debug!(%status, detail, "Request rejected");
        }
        (status, Json(ErrorBody { detail })).into_response()
    }
}
