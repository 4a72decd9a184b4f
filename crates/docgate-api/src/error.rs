//! Error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docgate_common::Error;
use docgate_core::IndexStoreError;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error: a docgate error rendered as `(status, ErrorResponse)`
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] Error);

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self(Error::Validation(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(Error::NotFound(message.into()))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self(Error::Auth(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<IndexStoreError> for ApiError {
    fn from(e: IndexStoreError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the log
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!("Request failed: {}", self.0);
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(Error::Upstream("engine down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(Error::Database("pool timed out".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = ApiError::from(Error::Database("password=hunter2".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "DATABASE_ERROR");
        assert_eq!(body.message, "Internal server error");
    }
}
