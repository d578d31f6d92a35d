//! Dataset capture driver
//!
//! Walks every (label, sequence, frame) key of a [`DatasetLayout`], reading
//! one camera frame per key and storing its feature vector.

use super::detector::{DetectorError, HandDetector};
use super::extractor::{extract, FeatureVector};
use super::layout::{DatasetLayout, SampleKey};
use crate::capture::{CameraError, CameraHandle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Granularity of the cancellable pause
const PAUSE_STEP: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Camera unavailable: {0}")]
    Camera(#[from] CameraError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write sample {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },
}

/// Progress notifications from [`CaptureDatasetDriver::run`]
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// Emitted before the pause that precedes each sequence
    SequenceStarted { label: String, sequence: u32 },
    FrameStored {
        key: SampleKey,
        path: PathBuf,
        hand_detected: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    CameraStopped,
    /// The detector process exited or its pipe broke
    DetectorStopped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub frames_written: u64,
    pub stop_reason: StopReason,
}

pub struct CaptureDatasetDriver {
    layout: DatasetLayout,
    camera: CameraHandle,
    detector: Box<dyn HandDetector>,
    sequence_pause: Duration,
    cancel: Arc<AtomicBool>,
}

impl CaptureDatasetDriver {
    pub fn new(layout: DatasetLayout, camera: CameraHandle, detector: Box<dyn HandDetector>) -> Self {
        Self {
            layout,
            camera,
            detector,
            sequence_pause: Duration::ZERO,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Operator cue before each sequence
    pub fn with_sequence_pause(mut self, pause: Duration) -> Self {
        self.sequence_pause = pause;
        self
    }

    /// Flag that stops the run at the next frame boundary when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Capture every sample of the layout.
    ///
    /// The camera is released when the run ends, however it ends.
    pub fn run(
        &mut self,
        mut on_event: impl FnMut(&CaptureEvent),
    ) -> Result<CollectionSummary, DatasetError> {
        let started = Instant::now();
        self.layout.prepare()?;
        self.camera.acquire()?;

        let result = self.capture_all(&mut on_event);
        self.camera.release();

        if let Ok(summary) = &result {
            tracing::info!(
                "Dataset capture finished: {} of {} samples in {:.1}s ({:?})",
                summary.frames_written,
                self.layout.total_samples(),
                started.elapsed().as_secs_f64(),
                summary.stop_reason
            );
        }
        result
    }

    fn capture_all(
        &mut self,
        on_event: &mut impl FnMut(&CaptureEvent),
    ) -> Result<CollectionSummary, DatasetError> {
        let mut frames_written = 0u64;
        let keys: Vec<SampleKey> = self.layout.keys().collect();

        for key in keys {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(self.summary(frames_written, StopReason::Cancelled));
            }

            if key.frame == 0 {
                tracing::info!("Collecting frames for {} video {}", key.label, key.sequence);
                on_event(&CaptureEvent::SequenceStarted {
                    label: key.label.clone(),
                    sequence: key.sequence,
                });
                if !self.pause() {
                    return Ok(self.summary(frames_written, StopReason::Cancelled));
                }
                // The first sample must show the pose taken during the pause
                self.camera.discard_buffered();
            }

            let frame = match self.camera.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Camera stopped yielding frames at {}: {}", key, e);
                    return Ok(self.summary(frames_written, StopReason::CameraStopped));
                }
            };

            let features = match self.detector.detect(&frame) {
                Ok(result) => extract(&result),
                // A bad answer for one frame counts as "no hand"
                Err(DetectorError::Protocol(e)) => {
                    tracing::warn!("Detection failed at {}: {}", key, e);
                    FeatureVector::zeros()
                }
                Err(e) => {
                    tracing::error!("Detector stopped at {}: {}", key, e);
                    return Ok(self.summary(frames_written, StopReason::DetectorStopped));
                }
            };

            let path = self.layout.sample_path(&key);
            ndarray_npy::write_npy(&path, &features.to_array()).map_err(|source| {
                DatasetError::Write {
                    path: path.clone(),
                    source,
                }
            })?;
            frames_written += 1;

            on_event(&CaptureEvent::FrameStored {
                key,
                path,
                hand_detected: !features.is_zero(),
            });
        }

        Ok(self.summary(frames_written, StopReason::Completed))
    }

    fn summary(&self, frames_written: u64, stop_reason: StopReason) -> CollectionSummary {
        CollectionSummary {
            frames_written,
            stop_reason,
        }
    }

    /// Sleep for the sequence pause. Returns `false` if cancelled meanwhile.
    fn pause(&self) -> bool {
        let deadline = Instant::now() + self.sequence_pause;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(PAUSE_STEP.min(deadline - now));
        }
    }
}
