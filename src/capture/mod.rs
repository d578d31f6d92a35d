//! Camera capture
//!
//! This module provides the camera handle and the device backends behind it.

pub mod handle;
pub mod traits;
pub mod webcam;

pub use handle::{CameraHandle, DEFAULT_FPS};
pub use traits::{CameraBackend, CameraError, CameraInfo, CameraProperties, Frame, FrameSource};
pub use webcam::{list_cameras, NokhwaBackend};
