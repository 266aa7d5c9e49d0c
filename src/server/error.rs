//! HTTP mapping for library errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::AvError;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// An [`AvError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub AvError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError(AvError::BadRequest(message.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            AvError::ArtifactNotFound { .. } | AvError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AvError> for ApiError {
    fn from(e: AvError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self.0);
        }

        let body = Json(ErrorResponse {
            detail: self.0.to_string(),
        });
        (status, body).into_response()
    }
}
