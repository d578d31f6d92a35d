//! Recording state management
//!
//! Defines the recording state machine and the values reported about it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Camera and writer are being opened
    Starting,
    /// Capture loop is running
    Recording,
    /// Capture loop is stopping and the file is being closed
    Finalizing,
}

/// Snapshot of the session for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecordingStatus {
    pub state: RecordingState,

    /// File being written (while recording)
    pub output_path: Option<PathBuf>,

    /// Frames appended so far
    pub frames_written: u64,

    /// Time since `start()` in milliseconds
    pub elapsed_ms: u64,
}

/// Result of a completed recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FinishedRecording {
    /// Path to the finalized video file
    pub output_path: PathBuf,

    /// Number of frames in the file
    pub frames_written: u64,

    /// Wall-clock duration of the capture loop in milliseconds
    pub duration_ms: u64,
}
