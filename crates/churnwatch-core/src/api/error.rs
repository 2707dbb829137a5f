//! HTTP mapping for crate errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::Error;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::Scoring(_) | Error::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict(_) | Error::RunInProgress => StatusCode::CONFLICT,
            Error::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_)
            | Error::Migration(_)
            | Error::Redis(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(status = %status, error = %self, "api_error");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
