//! Recording control service

use super::{cors, MessageResponse};
use crate::recorder::{RecordingError, RecordingSession, RecordingStatus};
use crate::utils::error::AppResult;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct RecorderState {
    pub session: Arc<RecordingSession>,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    #[serde(flatten)]
    status: MessageResponse,
    filepath: PathBuf,
    frames_written: u64,
    duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    success: bool,
    #[serde(flatten)]
    status: RecordingStatus,
}

pub fn router(session: Arc<RecordingSession>) -> Router {
    Router::new()
        .route("/start_recording", post(start_recording))
        .route("/stop_recording", post(stop_recording))
        .route("/download_video", get(download_video))
        .route("/recording_status", get(recording_status))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(RecorderState { session })
}

async fn start_recording(State(state): State<RecorderState>) -> AppResult<Json<MessageResponse>> {
    let session = state.session.clone();
    tokio::task::spawn_blocking(move || session.start()).await??;
    Ok(Json(MessageResponse::ok("Recording initiated successfully.")))
}

async fn stop_recording(State(state): State<RecorderState>) -> AppResult<Json<StopResponse>> {
    let session = state.session.clone();
    let finished = tokio::task::spawn_blocking(move || session.stop()).await??;
    Ok(Json(StopResponse {
        status: MessageResponse::ok("Recording stopped and file saved."),
        filepath: finished.output_path,
        frames_written: finished.frames_written,
        duration_ms: finished.duration_ms,
    }))
}

async fn recording_status(State(state): State<RecorderState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: state.session.status(),
    })
}

async fn download_video(State(state): State<RecorderState>) -> AppResult<Response> {
    let path = state.session.fetch_last_output()?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| RecordingError::NotFound(format!("{}: {}", path.display(), e)))?;
    let len = file.metadata().await.map_err(RecordingError::Io)?.len();

    tracing::info!("Serving recording {:?} ({} bytes)", path, len);
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(content_type(&path))),
        (header::CONTENT_LENGTH, HeaderValue::from(len)),
        (header::CONTENT_DISPOSITION, attachment_disposition(&path)),
    ];
    Ok((StatusCode::OK, headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("ogg" | "ogv") => "video/ogg",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

fn attachment_disposition(path: &Path) -> HeaderValue {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    let ascii: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(&name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
