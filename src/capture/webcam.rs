//! Webcam capture using nokhwa
//!
//! A nokhwa camera has to stay on the thread that opened it, so every open
//! device gets a worker thread that owns the camera and hands decoded RGB
//! frames over a bounded channel.

use super::traits::{CameraBackend, CameraError, CameraInfo, CameraProperties, Frame, FrameSource};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Longest wait for a device to open and report its format
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let index = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };
                CameraInfo {
                    index,
                    name: info.human_name().to_string(),
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Opens local webcams through nokhwa
#[derive(Debug, Clone)]
pub struct NokhwaBackend {
    read_timeout: Duration,
}

impl NokhwaBackend {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl CameraBackend for NokhwaBackend {
    fn open(&self, device_index: u32) -> Result<Box<dyn FrameSource>, CameraError> {
        let source = WebcamSource::open(device_index, self.read_timeout)?;
        Ok(Box::new(source))
    }
}

type FrameResult = Result<Frame, CameraError>;

/// An open webcam stream serviced by a worker thread
pub struct WebcamSource {
    device_index: u32,
    properties: CameraProperties,
    frames: Option<Receiver<FrameResult>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    /// Disconnects when the worker thread exits
    worker_done: Receiver<()>,
    read_timeout: Duration,
}

impl WebcamSource {
    /// Open the device and wait until the worker reports the stream format
    pub fn open(device_index: u32, read_timeout: Duration) -> Result<Self, CameraError> {
        let (setup_tx, setup_rx) = crossbeam_channel::bounded::<Result<CameraProperties, CameraError>>(1);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<FrameResult>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = running.clone();

        let worker = std::thread::Builder::new()
            .name(format!("webcam-{device_index}"))
            .spawn(move || {
                let _done = done_tx;
                let format =
                    RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

                let mut camera = match Camera::new(CameraIndex::Index(device_index), format) {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = setup_tx.send(Err(CameraError::DeviceUnavailable(format!(
                            "failed to open camera {device_index}: {e}"
                        ))));
                        return;
                    }
                };

                if let Err(e) = camera.open_stream() {
                    let _ = setup_tx.send(Err(CameraError::DeviceUnavailable(format!(
                        "failed to open camera stream: {e}"
                    ))));
                    return;
                }

                let camera_format = camera.camera_format();
                let properties = CameraProperties {
                    width: camera_format.resolution().width(),
                    height: camera_format.resolution().height(),
                    fps: camera_format.frame_rate() as f64,
                };
                if setup_tx.send(Ok(properties)).is_err() {
                    let _ = camera.stop_stream();
                    return;
                }

                while worker_running.load(Ordering::SeqCst) {
                    // Blocks until the camera delivers the next frame
                    let item = camera
                        .frame()
                        .and_then(|buffer| buffer.decode_image::<RgbFormat>())
                        .map(|image| Frame::new(image.width(), image.height(), image.into_raw()))
                        .map_err(|e| CameraError::ReadError(e.to_string()));

                    // Receiver dropped means the source was closed
                    if frame_tx.send(item).is_err() {
                        break;
                    }
                }

                if let Err(e) = camera.stop_stream() {
                    tracing::warn!("Error stopping camera stream: {:?}", e);
                }
                tracing::debug!("Webcam worker {} stopped", device_index);
            })
            .map_err(|e| {
                CameraError::DeviceUnavailable(format!("failed to spawn camera worker: {e}"))
            })?;

        let properties = match setup_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(properties)) => properties,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // The worker gives up on its own once it sees the closed setup channel
                running.store(false, Ordering::SeqCst);
                tracing::warn!(
                    "Camera {} did not open within {:?}; detaching its worker",
                    device_index,
                    OPEN_TIMEOUT
                );
                return Err(CameraError::DeviceUnavailable(format!(
                    "camera {device_index} did not open within {OPEN_TIMEOUT:?}"
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                return Err(CameraError::DeviceUnavailable(
                    "camera worker exited during setup".to_string(),
                ));
            }
        };

        Ok(Self {
            device_index,
            properties,
            frames: Some(frame_rx),
            running,
            worker: Some(worker),
            worker_done: done_rx,
            read_timeout,
        })
    }
}

impl FrameSource for WebcamSource {
    fn properties(&self) -> CameraProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| CameraError::ReadError("stream closed".to_string()))?;

        match frames.recv_timeout(self.read_timeout) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => Err(CameraError::ReadError(format!(
                "no frame within {:?}",
                self.read_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CameraError::ReadError("camera worker stopped".to_string()))
            }
        }
    }

    fn discard_buffered(&mut self) {
        if let Some(frames) = self.frames.as_ref() {
            let dropped = frames.try_iter().count();
            if dropped > 0 {
                tracing::debug!("Dropped {} stale frame(s) from camera {}", dropped, self.device_index);
            }
        }
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the receiver unblocks a worker waiting to hand over a frame
        self.frames.take();
        if let Some(worker) = self.worker.take() {
            if !join_bounded(worker, &self.worker_done, self.read_timeout) {
                tracing::warn!(
                    "Webcam worker {} still blocked after {:?}; detaching it",
                    self.device_index,
                    self.read_timeout
                );
            }
        }
    }
}

/// Join `worker` if it exits within `timeout`, otherwise detach it.
///
/// `done` must disconnect when the worker returns. Returns `false` when the
/// worker was detached.
fn join_bounded(worker: JoinHandle<()>, done: &Receiver<()>, timeout: Duration) -> bool {
    match done.recv_timeout(timeout) {
        Err(RecvTimeoutError::Timeout) => false,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if worker.join().is_err() {
                tracing::warn!("Webcam worker panicked");
            }
            true
        }
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.close();
    }
}
