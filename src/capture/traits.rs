//! Capture trait definitions
//!
//! Device-agnostic types and traits for camera sources.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to read frame: {0}")]
    ReadError(String),
}

/// A single captured frame, packed RGB24 (3 bytes per pixel, row-major)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// Bytes per pixel of the packed RGB layout
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Expected buffer length for the given dimensions
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }

    /// Whether the buffer length matches the frame dimensions
    pub fn is_complete(&self) -> bool {
        self.data.len() == Self::expected_len(self.width, self.height)
    }
}

/// Stream properties reported by an open device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraProperties {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Frames per second as reported by the device (may be 0 when unknown)
    pub fps: f64,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Device index
    pub index: String,

    /// Device name
    pub name: String,
}

/// An open device stream.
///
/// Implementations own the OS-level stream; `close` must be safe to call
/// more than once.
pub trait FrameSource: Send {
    /// Properties of the open stream
    fn properties(&self) -> CameraProperties;

    /// Read the next frame
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Drop frames captured before now, so the next read is fresh
    fn discard_buffered(&mut self) {}

    /// Close the underlying stream
    fn close(&mut self);
}

/// Opens device streams by index
pub trait CameraBackend: Send + Sync {
    fn open(&self, device_index: u32) -> Result<Box<dyn FrameSource>, CameraError>;
}
