//! Error types and handling
//!
//! Maps module errors onto HTTP responses.

use crate::recorder::RecordingError;
use crate::upload::UploadError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type returned by HTTP handlers
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Error body sent to the client
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Upload(err) => match err {
                UploadError::NoFilePart | UploadError::NoFile | UploadError::UnsupportedType { .. } => {
                    StatusCode::BAD_REQUEST
                }
                UploadError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Recording(err) => match err {
                RecordingError::AlreadyActive => StatusCode::CONFLICT,
                RecordingError::NotActive => StatusCode::BAD_REQUEST,
                RecordingError::NotFound(_) => StatusCode::NOT_FOUND,
                RecordingError::CameraUnavailable(_)
                | RecordingError::Writer(_)
                | RecordingError::Finalize(_)
                | RecordingError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Multipart(err) => err.status(),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal causes are only logged.
    pub fn message(&self) -> String {
        match self {
            AppError::Upload(err) => err.to_string(),
            AppError::Recording(err) => match err {
                RecordingError::AlreadyActive => "Recording already active.".to_string(),
                RecordingError::CameraUnavailable(_) => {
                    "Failed to access camera resource.".to_string()
                }
                RecordingError::NotActive => "No active recording to stop.".to_string(),
                RecordingError::NotFound(_) => {
                    "Video file not found or recording not complete.".to_string()
                }
                RecordingError::Writer(_) | RecordingError::Io(_) => {
                    "Failed to start recording.".to_string()
                }
                RecordingError::Finalize(_) => "Failed to save recording.".to_string(),
            },
            AppError::Multipart(err) => err.body_text(),
            AppError::Internal(_) => "Internal server error.".to_string(),
        }
    }
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            success: false,
            message: error.message(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CameraError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(UploadError::NoFilePart), StatusCode::BAD_REQUEST),
            (AppError::from(UploadError::NoFile), StatusCode::BAD_REQUEST),
            (
                AppError::from(UploadError::StorageError(std::io::Error::other("disk full"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::from(RecordingError::AlreadyActive), StatusCode::CONFLICT),
            (AppError::from(RecordingError::NotActive), StatusCode::BAD_REQUEST),
            (
                AppError::from(RecordingError::NotFound("gone".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(RecordingError::CameraUnavailable(
                    CameraError::DeviceUnavailable("busy".into()),
                )),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn test_messages_hide_internal_causes() {
        let err = AppError::from(RecordingError::CameraUnavailable(
            CameraError::DeviceUnavailable("/dev/video0 busy".into()),
        ));
        assert_eq!(err.message(), "Failed to access camera resource.");

        let err = AppError::from(UploadError::StorageError(std::io::Error::other("disk full")));
        assert_eq!(err.message(), "Server error during save: disk full");
    }
}
