use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Request-scoped failures mapped onto HTTP statuses.
///
/// Startup failures never reach this type; they abort the process from
/// `main` before the listener binds.
#[derive(Debug)]
pub enum ApiError {
    InvalidThreshold(f32),
    BadUpload(String),
    UnreadableImage {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidImage {
        path: PathBuf,
        source: inference::InferenceError,
    },
    Detection(inference::InferenceError),
    Remote(bridge::BridgeError),
    Internal(String),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::InvalidThreshold(value) => (
                StatusCode::BAD_REQUEST,
                format!("score_threshold must lie in [0, 1], got {value}"),
            ),
            ApiError::BadUpload(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            ApiError::UnreadableImage { path, source } => (
                StatusCode::BAD_REQUEST,
                format!("cannot read image {}: {source}", path.display()),
            ),
            ApiError::InvalidImage { path, source } => (
                StatusCode::BAD_REQUEST,
                format!("{} is not a decodable image: {source}", path.display()),
            ),
            ApiError::Detection(source) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("local detection failed: {source}"),
            ),
            ApiError::Remote(source) => (
                StatusCode::BAD_GATEWAY,
                format!("remote detector call failed: {source}"),
            ),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "request failed");
        } else {
            tracing::warn!(status = %status, error = %message, "request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let (status, message) = ApiError::InvalidThreshold(1.5).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("1.5"), "message should echo the value: {message}");

        let (status, _) = ApiError::Remote(bridge::BridgeError::Unauthorized).status_and_message();
        assert_eq!(status, StatusCode::BAD_GATEWAY, "remote failures are 502");

        let (status, message) = ApiError::UnreadableImage {
            path: PathBuf::from("/tmp/missing.png"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        }
        .status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            message.contains("/tmp/missing.png"),
            "message should name the path: {message}"
        );
    }
}
