//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use filetask_engine::EngineError;
use filetask_store::StoreError;
use thiserror::Error;
use tracing::error;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Request body or parameters the handler cannot act on.
    #[error("{0}")]
    BadRequest(String),
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::InvalidData(_) => StatusCode::BAD_REQUEST,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(err) => match err {
                EngineError::TaskNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::TaskAlreadyRunning(_)
                | EngineError::TaskRunning(_)
                | EngineError::TaskNotRunning(_) => StatusCode::CONFLICT,
                EngineError::InvalidSchedule { .. } => StatusCode::BAD_REQUEST,
                EngineError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Store(err) => store_status(err),
            },
            ApiError::Store(err) => store_status(err),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Errors seen by [`ApiClient`](crate::ApiClient) callers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, timed out or cut short.
    #[error("cannot reach filetask at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with an error status.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status of an error answer, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
