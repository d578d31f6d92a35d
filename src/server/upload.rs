//! Upload service

use super::{cors, MessageResponse};
use crate::config::UploadsConfig;
use crate::upload::{UploadError, UploadReceiver};
use crate::utils::error::AppResult;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Multipart field holding the video
pub const VIDEO_FIELD: &str = "video";

#[derive(Clone)]
pub struct UploadState {
    pub receiver: Arc<UploadReceiver>,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    #[serde(flatten)]
    status: MessageResponse,
    filename: String,
}

pub fn router(config: &UploadsConfig) -> Router {
    let receiver = UploadReceiver::new(
        config.output_dir.clone(),
        config.file_prefix.clone(),
        &config.allowed_extensions,
    );
    let state = UploadState {
        receiver: Arc::new(receiver),
    };

    let router = Router::new().route(
        "/upload_video",
        post(upload_video).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
    );
    let router = match &config.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload_video(
    State(state): State<UploadState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!("Upload without multipart body: {}", rejection);
            return Err(reject(UploadError::NoFilePart));
        }
    };

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_owned);
        let mut upload = state
            .receiver
            .begin(filename.as_deref())
            .await
            .map_err(reject)?;

        // An early return drops `upload`, which removes the partial file
        while let Some(chunk) = field.chunk().await? {
            upload.write(&chunk).await?;
        }
        let stored = upload.finish().await?;

        return Ok(Json(UploadResponse {
            status: MessageResponse::ok("Video successfully uploaded and saved on the server."),
            filename: stored.filename,
        }));
    }

    Err(reject(UploadError::NoFilePart))
}

fn reject(err: UploadError) -> crate::utils::AppError {
    tracing::info!("Upload rejected: {}", err);
    err.into()
}
