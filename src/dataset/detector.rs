//! Landmark detection
//!
//! The detection model is opaque to this crate. [`SidecarDetector`] runs it
//! as a child process and exchanges one frame per request over stdio:
//!
//! - request: a JSON header line `{"width":W,"height":H,"len":N}` followed by
//!   `N` raw RGB24 bytes
//! - response: one JSON line with optional `right_hand_landmarks`,
//!   `left_hand_landmarks`, `pose_landmarks` and `face_landmarks` arrays of
//!   `{"x","y","z"}` points

use crate::capture::Frame;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Detector command is empty")]
    EmptyCommand,

    #[error("Failed to start detector: {0}")]
    Spawn(#[source] io::Error),

    #[error("Detector IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid detector response: {0}")]
    Protocol(String),

    #[error("Detector exited")]
    Exited,
}

/// A detector-reported point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Landmark sets found in one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionResult {
    pub right_hand_landmarks: Option<Vec<Landmark>>,
    pub left_hand_landmarks: Option<Vec<Landmark>>,
    pub pose_landmarks: Option<Vec<Landmark>>,
    pub face_landmarks: Option<Vec<Landmark>>,
}

/// Maps a frame to its landmark sets
pub trait HandDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, DetectorError>;
}

#[derive(Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
    len: usize,
}

/// Detector running as a child process
pub struct SidecarDetector {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl SidecarDetector {
    /// Spawn `command[0]` with the remaining entries as arguments
    pub fn spawn(command: &[String]) -> Result<Self, DetectorError> {
        let (program, args) = command.split_first().ok_or(DetectorError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(DetectorError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DetectorError::Protocol("detector stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DetectorError::Protocol("detector stdout unavailable".to_string()))?;

        tracing::info!("Detector started: {}", command.join(" "));
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            line: String::new(),
        })
    }
}

impl HandDetector for SidecarDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, DetectorError> {
        let header = FrameHeader {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        };
        let header =
            serde_json::to_string(&header).map_err(|e| DetectorError::Protocol(e.to_string()))?;

        self.stdin.write_all(header.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.write_all(&frame.data)?;
        self.stdin.flush()?;

        self.line.clear();
        if self.stdout.read_line(&mut self.line)? == 0 {
            return Err(DetectorError::Exited);
        }

        serde_json::from_str(self.line.trim()).map_err(|e| DetectorError::Protocol(e.to_string()))
    }
}

impl Drop for SidecarDetector {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
