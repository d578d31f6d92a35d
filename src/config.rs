//! Configuration
//!
//! Settings are read from a TOML file with one table per service. Missing
//! keys fall back to the defaults below.

use crate::recorder::{SessionOptions, WriterKind};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "gesture-capture.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub uploads: UploadsConfig,
    pub recorder: RecorderConfig,
    pub dataset: DatasetConfig,
}

/// Browser upload service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    pub bind: SocketAddr,

    /// Directory receiving uploaded files
    pub output_dir: PathBuf,

    pub file_prefix: String,

    /// Accepted extensions, matched case-insensitively
    pub allowed_extensions: Vec<String>,

    /// Request body limit for uploads
    pub max_upload_bytes: usize,

    /// Directory served at `/` (the browser client)
    pub static_dir: Option<PathBuf>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            output_dir: PathBuf::from("client_recordings"),
            file_prefix: "client_recording".to_string(),
            allowed_extensions: ["webm", "mp4", "ogg"].map(String::from).to_vec(),
            max_upload_bytes: 512 * 1024 * 1024,
            static_dir: None,
        }
    }
}

/// Server-side recording service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub bind: SocketAddr,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub device_index: u32,

    /// Frame rate used when the camera reports none
    pub default_fps: f64,

    /// Delay before the first frame is read
    pub warmup_ms: u64,

    /// Backoff after a failed frame read
    pub read_retry_ms: u64,

    /// Longest wait for a single frame
    pub read_timeout_ms: u64,

    pub writer: WriterKind,

    /// ffmpeg video codec (ffmpeg writer only)
    pub codec: String,

    /// Container extension (ffmpeg writer only)
    pub extension: String,

    pub ffmpeg_path: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            output_dir: PathBuf::from("presentation_recordings"),
            file_prefix: "presentation_recording".to_string(),
            device_index: 0,
            default_fps: crate::capture::DEFAULT_FPS,
            warmup_ms: 500,
            read_retry_ms: 100,
            read_timeout_ms: 2000,
            writer: WriterKind::Ffmpeg,
            codec: "libx264".to_string(),
            extension: "mp4".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl RecorderConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            output_dir: self.output_dir.clone(),
            file_prefix: self.file_prefix.clone(),
            warmup: Duration::from_millis(self.warmup_ms),
            read_retry: Duration::from_millis(self.read_retry_ms),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Local dataset capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub root: PathBuf,
    pub labels: Vec<String>,

    /// Sequences recorded per label
    pub sequences: u32,

    /// Frames per sequence
    pub sequence_length: u32,

    /// Pause before each sequence
    pub sequence_pause_ms: u64,

    pub device_index: u32,

    /// Landmark detector program and arguments
    pub detector_command: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("MP_Data"),
            labels: ["swipe_left", "swipe_right", "no_gesture"]
                .map(String::from)
                .to_vec(),
            sequences: 30,
            sequence_length: 30,
            sequence_pause_ms: 2000,
            device_index: 0,
            detector_command: ["python3", "hand_landmarker.py"].map(String::from).to_vec(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist and parse. Without one,
    /// [`DEFAULT_CONFIG_FILE`] is used if present; problems with it are
    /// logged and the defaults are returned.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::load_or_default(Path::new(DEFAULT_CONFIG_FILE))),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load config from `path` or return default
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("{:#}; using defaults", e),
            }
        }
        Self::default()
    }
}
