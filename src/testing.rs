//! Test doubles shared by unit tests

use crate::capture::{CameraBackend, CameraError, CameraProperties, Frame, FrameSource};
use crate::dataset::{DetectionResult, DetectorError, HandDetector, Landmark};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    active: AtomicUsize,
    reads: AtomicU64,
    discards: AtomicUsize,
}

/// Camera backend producing synthetic frames.
///
/// Frame `n` is filled with the byte `n % 256`.
pub(crate) struct ScriptedBackend {
    props: CameraProperties,
    available: bool,
    fail_every: Option<u64>,
    frame_limit: Option<u64>,
    read_delay: Duration,
    open_delay: Duration,
    counters: Arc<Counters>,
}

impl ScriptedBackend {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            props: CameraProperties { width, height, fps },
            available: true,
            fail_every: None,
            frame_limit: None,
            read_delay: Duration::from_millis(5),
            open_delay: Duration::ZERO,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A backend whose device can never be opened
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(0, 0, 0.0)
        }
    }

    /// Every `n`th read fails with a read error
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    /// Opening the device takes `delay`
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Reads after the first `n` always fail
    pub fn with_frame_limit(mut self, n: u64) -> Self {
        self.frame_limit = Some(n);
        self
    }

    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn active_streams(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Calls to `discard_buffered` across all opened streams
    pub fn discards(&self) -> usize {
        self.counters.discards.load(Ordering::SeqCst)
    }
}

impl CameraBackend for ScriptedBackend {
    fn open(&self, device_index: u32) -> Result<Box<dyn FrameSource>, CameraError> {
        std::thread::sleep(self.open_delay);
        if !self.available {
            return Err(CameraError::DeviceUnavailable(format!(
                "no device at index {device_index}"
            )));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            props: self.props,
            fail_every: self.fail_every,
            frame_limit: self.frame_limit,
            read_delay: self.read_delay,
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

struct ScriptedSource {
    props: CameraProperties,
    fail_every: Option<u64>,
    frame_limit: Option<u64>,
    read_delay: Duration,
    counters: Arc<Counters>,
    closed: bool,
}

impl FrameSource for ScriptedSource {
    fn properties(&self) -> CameraProperties {
        self.props
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        std::thread::sleep(self.read_delay);
        let n = self.counters.reads.fetch_add(1, Ordering::SeqCst) + 1;

        if self.frame_limit.is_some_and(|limit| n > limit) {
            return Err(CameraError::ReadError("stream ended".to_string()));
        }
        if self.fail_every.is_some_and(|every| n % every == 0) {
            return Err(CameraError::ReadError(format!("dropped frame {n}")));
        }

        let len = Frame::expected_len(self.props.width, self.props.height);
        Ok(Frame::new(
            self.props.width,
            self.props.height,
            vec![(n % 256) as u8; len],
        ))
    }

    fn discard_buffered(&mut self) {
        self.counters.discards.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Detector that reports a right hand whose points encode the frame's
/// first byte: point `i` is `(v + i, v + i + 0.25, v + i + 0.5)`.
///
/// Frames whose first byte is odd report no hand.
pub(crate) struct EchoDetector;

impl HandDetector for EchoDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, DetectorError> {
        let v = frame.data.first().copied().unwrap_or(0);
        if v % 2 == 1 {
            return Ok(DetectionResult::default());
        }
        let base = v as f64;
        let points = (0..21)
            .map(|i| Landmark {
                x: base + i as f64,
                y: base + i as f64 + 0.25,
                z: base + i as f64 + 0.5,
            })
            .collect();
        Ok(DetectionResult {
            right_hand_landmarks: Some(points),
            ..Default::default()
        })
    }
}

/// Detector whose every call fails with the error built by `make_error`
pub(crate) struct FailingDetector {
    make_error: fn() -> DetectorError,
}

impl FailingDetector {
    pub fn new(make_error: fn() -> DetectorError) -> Self {
        Self { make_error }
    }
}

impl HandDetector for FailingDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<DetectionResult, DetectorError> {
        Err((self.make_error)())
    }
}
