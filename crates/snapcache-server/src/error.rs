use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;
use snapcache_core::{HttpError, KeyError};
use snapcache_flight::CacheError;
use thiserror::Error;

/// Errors returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Path segments do not form a valid key
    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// No row has been written for the key yet
    #[error("no snapshot for {0}")]
    NotFound(String),
}

impl HttpError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidKey(_) => StatusCode::BAD_REQUEST,
            Self::Cache(e) => e.status_code(),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::InvalidKey(_) => "invalid_request_error",
            Self::Cache(e) => e.error_type(),
            Self::NotFound(_) => "not_found_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Cache(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                message: self.client_message(),
                r#type: self.error_type().to_owned(),
                code: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}
