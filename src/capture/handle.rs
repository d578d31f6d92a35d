//! Camera handle
//!
//! Owns the lifetime of a single device stream: opened lazily on first
//! `acquire`, closed by `release` (or on drop).

use super::traits::{CameraBackend, CameraError, CameraProperties, Frame, FrameSource};
use std::sync::Arc;

/// Frame rate used when the device does not report a usable one
pub const DEFAULT_FPS: f64 = 20.0;

/// Lazily-acquired handle to one camera device
pub struct CameraHandle {
    device_index: u32,
    backend: Arc<dyn CameraBackend>,
    source: Option<Box<dyn FrameSource>>,
    default_fps: f64,
}

impl CameraHandle {
    /// Create a handle for `device_index`. No device is opened yet.
    pub fn new(device_index: u32, backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            device_index,
            backend,
            source: None,
            default_fps: DEFAULT_FPS,
        }
    }

    /// Override the fallback frame rate
    pub fn with_default_fps(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.default_fps = fps;
        }
        self
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Open the device stream. Returns immediately if it is already open.
    pub fn acquire(&mut self) -> Result<(), CameraError> {
        if self.source.is_some() {
            return Ok(());
        }

        let source = self.backend.open(self.device_index)?;
        let props = source.properties();
        tracing::info!(
            "Camera {} acquired ({}x{} @ {}fps)",
            self.device_index,
            props.width,
            props.height,
            props.fps
        );
        self.source = Some(source);
        Ok(())
    }

    /// Close the device stream. Safe to call when nothing is open.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            tracing::info!("Camera {} released", self.device_index);
        }
    }

    /// Read one frame from the open stream
    pub fn read_frame(&mut self) -> Result<Frame, CameraError> {
        match self.source.as_mut() {
            Some(source) => source.read_frame(),
            None => Err(CameraError::DeviceUnavailable(format!(
                "camera {} is not acquired",
                self.device_index
            ))),
        }
    }

    /// Drop frames the stream buffered while nobody was reading
    pub fn discard_buffered(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.discard_buffered();
        }
    }

    /// Width, height and frame rate of the open stream.
    ///
    /// A reported rate of zero or below is replaced with the default rate.
    pub fn query_properties(&self) -> Result<CameraProperties, CameraError> {
        let source = self.source.as_ref().ok_or_else(|| {
            CameraError::DeviceUnavailable(format!("camera {} is not acquired", self.device_index))
        })?;

        let mut props = source.properties();
        if !(props.fps > 0.0) {
            props.fps = self.default_fps;
        }
        Ok(props)
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}
