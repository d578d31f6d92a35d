//! Recording session
//!
//! Owns the server-side recording lifecycle: camera acquisition, the
//! background capture loop, and finalizing the output file.
//!
//! Only one session exists per process and it records one file at a time.
//! The capture thread owns the writer for the whole recording and hands it
//! back through its join handle, so `stop` can never overlap a frame write.

use super::state::{FinishedRecording, RecordingState, RecordingStatus};
use super::writer::{VideoWriter, VideoWriterFactory, WriterError};
use crate::capture::{CameraError, CameraHandle};
use crate::utils::naming;
use chrono::Local;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Recording-related errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Recording already active")]
    AlreadyActive,

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(#[source] CameraError),

    #[error("No active recording")]
    NotActive,

    #[error("Recording not found: {0}")]
    NotFound(String),

    #[error("Failed to open video writer: {0}")]
    Writer(#[source] WriterError),

    #[error("Failed to finalize recording: {0}")]
    Finalize(#[source] WriterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecordingResult<T> = Result<T, RecordingError>;

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory receiving recordings
    pub output_dir: PathBuf,

    /// File name prefix, e.g. `presentation_recording`
    pub file_prefix: String,

    /// Delay before the first frame read
    pub warmup: Duration,

    /// Backoff after a failed frame read
    pub read_retry: Duration,
}

/// A running capture loop
struct ActiveCapture {
    output_path: PathBuf,
    started_at: Instant,
    running: Arc<AtomicBool>,
    frames_written: Arc<AtomicU64>,
    thread: JoinHandle<Box<dyn VideoWriter>>,
}

enum SessionSlot {
    Idle,
    /// Claimed by a `start` call that is still opening the camera
    Starting,
    Recording(ActiveCapture),
    Finalizing {
        output_path: PathBuf,
        started_at: Instant,
        frames_written: Arc<AtomicU64>,
    },
}

/// Single recording slot bound to one shared camera
pub struct RecordingSession {
    options: SessionOptions,
    camera: Arc<Mutex<CameraHandle>>,
    writers: Arc<dyn VideoWriterFactory>,
    slot: Mutex<SessionSlot>,
    last_output: Mutex<Option<PathBuf>>,
}

impl RecordingSession {
    pub fn new(
        options: SessionOptions,
        camera: Arc<Mutex<CameraHandle>>,
        writers: Arc<dyn VideoWriterFactory>,
    ) -> Self {
        Self {
            options,
            camera,
            writers,
            slot: Mutex::new(SessionSlot::Idle),
            last_output: Mutex::new(None),
        }
    }

    /// Current state of the session
    pub fn state(&self) -> RecordingState {
        match &*self.slot.lock() {
            SessionSlot::Idle => RecordingState::Idle,
            SessionSlot::Starting => RecordingState::Starting,
            SessionSlot::Recording(_) => RecordingState::Recording,
            SessionSlot::Finalizing { .. } => RecordingState::Finalizing,
        }
    }

    /// State plus progress of the current recording
    pub fn status(&self) -> RecordingStatus {
        let slot = self.slot.lock();
        let (state, progress) = match &*slot {
            SessionSlot::Idle => (RecordingState::Idle, None),
            SessionSlot::Starting => (RecordingState::Starting, None),
            SessionSlot::Recording(active) => (
                RecordingState::Recording,
                Some((&active.output_path, active.started_at, &active.frames_written)),
            ),
            SessionSlot::Finalizing {
                output_path,
                started_at,
                frames_written,
            } => (
                RecordingState::Finalizing,
                Some((output_path, *started_at, frames_written)),
            ),
        };

        match progress {
            Some((path, started_at, frames)) => RecordingStatus {
                state,
                output_path: Some(path.clone()),
                frames_written: frames.load(Ordering::Relaxed),
                elapsed_ms: started_at.elapsed().as_millis() as u64,
            },
            None => RecordingStatus {
                state,
                output_path: None,
                frames_written: 0,
                elapsed_ms: 0,
            },
        }
    }

    /// Start recording.
    ///
    /// Acquires the camera, opens a writer for a new timestamped file and
    /// launches the capture loop. Fails with `AlreadyActive` unless idle.
    ///
    /// The slot is claimed as `Starting` before the camera is opened, so the
    /// session lock is never held across device setup.
    pub fn start(&self) -> RecordingResult<PathBuf> {
        {
            let mut slot = self.slot.lock();
            if !matches!(*slot, SessionSlot::Idle) {
                return Err(RecordingError::AlreadyActive);
            }
            *slot = SessionSlot::Starting;
        }

        match self.launch() {
            Ok(active) => {
                let output_path = active.output_path.clone();
                *self.slot.lock() = SessionSlot::Recording(active);
                Ok(output_path)
            }
            Err(e) => {
                *self.slot.lock() = SessionSlot::Idle;
                Err(e)
            }
        }
    }

    /// Open camera and writer, then spawn the capture loop
    fn launch(&self) -> RecordingResult<ActiveCapture> {
        let properties = {
            let mut camera = self.camera.lock();
            camera
                .acquire()
                .map_err(RecordingError::CameraUnavailable)?;
            match camera.query_properties() {
                Ok(props) => props,
                Err(e) => {
                    camera.release();
                    return Err(RecordingError::CameraUnavailable(e));
                }
            }
        };

        let output_path = match self.open_output_path() {
            Ok(path) => path,
            Err(e) => {
                self.camera.lock().release();
                return Err(e.into());
            }
        };

        let writer = match self.writers.create(&output_path, &properties) {
            Ok(writer) => writer,
            Err(e) => {
                self.camera.lock().release();
                discard_empty(&output_path);
                return Err(RecordingError::Writer(e));
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let frames_written = Arc::new(AtomicU64::new(0));
        let thread = {
            let camera = self.camera.clone();
            let running = running.clone();
            let frames_written = frames_written.clone();
            let warmup = self.options.warmup;
            let read_retry = self.options.read_retry;
            std::thread::Builder::new()
                .name("recording-capture".to_string())
                .spawn(move || {
                    capture_loop(camera, writer, running, frames_written, warmup, read_retry)
                })
        };

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                self.camera.lock().release();
                discard_empty(&output_path);
                return Err(e.into());
            }
        };

        tracing::info!(
            "Recording started: {:?} ({}x{} @ {}fps)",
            output_path,
            properties.width,
            properties.height,
            properties.fps
        );

        Ok(ActiveCapture {
            output_path,
            started_at: Instant::now(),
            running,
            frames_written,
            thread,
        })
    }

    fn open_output_path(&self) -> std::io::Result<PathBuf> {
        let (path, _file) = naming::create_unique_file(
            &self.options.output_dir,
            &self.options.file_prefix,
            self.writers.extension(),
            &Local::now(),
        )?;
        Ok(path)
    }

    /// Stop recording.
    ///
    /// Blocks until the capture loop has exited, then finalizes the file and
    /// releases the camera. Fails with `NotActive` unless recording.
    pub fn stop(&self) -> RecordingResult<FinishedRecording> {
        let active = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, SessionSlot::Idle) {
                SessionSlot::Recording(active) => {
                    *slot = SessionSlot::Finalizing {
                        output_path: active.output_path.clone(),
                        started_at: active.started_at,
                        frames_written: active.frames_written.clone(),
                    };
                    active
                }
                other => {
                    *slot = other;
                    return Err(RecordingError::NotActive);
                }
            }
        };

        tracing::info!("Stopping recording: {:?}", active.output_path);
        active.running.store(false, Ordering::SeqCst);

        let finished = match active.thread.join() {
            Ok(writer) => writer.finish().map_err(RecordingError::Finalize),
            Err(_) => Err(RecordingError::Finalize(WriterError::Encoder(
                "capture thread panicked".to_string(),
            ))),
        };

        self.camera.lock().release();
        let duration_ms = active.started_at.elapsed().as_millis() as u64;
        let frames_written = active.frames_written.load(Ordering::SeqCst);
        *self.slot.lock() = SessionSlot::Idle;

        let output_path = finished?;
        *self.last_output.lock() = Some(output_path.clone());

        tracing::info!(
            "Recording finalized: {:?} ({} frames in {}ms)",
            output_path,
            frames_written,
            duration_ms
        );

        Ok(FinishedRecording {
            output_path,
            frames_written,
            duration_ms,
        })
    }

    /// Path of the most recently finalized recording.
    ///
    /// Fails with `NotFound` while a recording is running or being
    /// finalized, when nothing has been recorded yet, or when the file is
    /// gone from disk.
    pub fn fetch_last_output(&self) -> RecordingResult<PathBuf> {
        if !matches!(*self.slot.lock(), SessionSlot::Idle) {
            return Err(RecordingError::NotFound(
                "recording not complete".to_string(),
            ));
        }

        match &*self.last_output.lock() {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(RecordingError::NotFound(format!(
                "{} no longer exists",
                path.display()
            ))),
            None => Err(RecordingError::NotFound(
                "no recording has been made".to_string(),
            )),
        }
    }

    /// Finalize any in-flight recording and release the camera.
    pub fn shutdown(&self) {
        if self.state() == RecordingState::Recording {
            match self.stop() {
                Ok(finished) => tracing::info!(
                    "Recording finalized on shutdown: {:?}",
                    finished.output_path
                ),
                Err(RecordingError::NotActive) => {}
                Err(e) => tracing::error!("Failed to finalize recording on shutdown: {}", e),
            }
        }
        self.camera.lock().release();
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Remove a reserved output file that never received data
fn discard_empty(path: &std::path::Path) {
    if std::fs::metadata(path).is_ok_and(|m| m.len() == 0) {
        let _ = std::fs::remove_file(path);
    }
}

/// Reads frames and appends them until `running` is cleared.
///
/// The flag is only checked between complete iterations. Read failures are
/// logged and retried after `read_retry`; the recording keeps going.
fn capture_loop(
    camera: Arc<Mutex<CameraHandle>>,
    mut writer: Box<dyn VideoWriter>,
    running: Arc<AtomicBool>,
    frames_written: Arc<AtomicU64>,
    warmup: Duration,
    read_retry: Duration,
) -> Box<dyn VideoWriter> {
    // Give the camera a moment to warm up
    std::thread::sleep(warmup);
    tracing::debug!("Capture loop started");

    let mut read_failures: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let frame = camera.lock().read_frame();
        match frame {
            Ok(frame) => match writer.write_frame(&frame) {
                Ok(()) => {
                    frames_written.store(writer.frames_written(), Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!("Failed to write frame: {}", e);
                    std::thread::sleep(read_retry);
                }
            },
            Err(e) => {
                read_failures += 1;
                tracing::warn!("Could not read frame from camera: {}", e);
                std::thread::sleep(read_retry);
            }
        }
    }

    tracing::debug!(
        "Capture loop exited after {} frames ({} failed reads)",
        writer.frames_written(),
        read_failures
    );
    writer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::writer::Y4mWriterFactory;
    use crate::testing::ScriptedBackend;
    use std::fs::File;
    use tempfile::{tempdir, TempDir};

    fn session_with(backend: Arc<ScriptedBackend>) -> (RecordingSession, TempDir) {
        let dir = tempdir().unwrap();
        let camera = Arc::new(Mutex::new(CameraHandle::new(0, backend)));
        let options = SessionOptions {
            output_dir: dir.path().join("recordings"),
            file_prefix: "presentation_recording".to_string(),
            warmup: Duration::from_millis(10),
            read_retry: Duration::from_millis(5),
        };
        let session = RecordingSession::new(options, camera, Arc::new(Y4mWriterFactory));
        (session, dir)
    }

    fn wait_for_frames(session: &RecordingSession, frames: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.status().frames_written < frames {
            assert!(Instant::now() < deadline, "capture loop wrote no frames");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_start_stop_produces_valid_file() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        let (session, _dir) = session_with(backend.clone());

        let path = session.start().unwrap();
        assert_eq!(session.state(), RecordingState::Recording);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("presentation_recording_"));
        assert!(name.ends_with(".y4m"));

        wait_for_frames(&session, 3);
        let finished = session.stop().unwrap();

        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(finished.output_path, path);
        assert!(finished.frames_written >= 3);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        assert_eq!(backend.active_streams(), 0);

        let mut decoder = y4m::decode(File::open(&path).unwrap()).unwrap();
        assert_eq!((decoder.get_width(), decoder.get_height()), (8, 6));
        let mut frames = 0u64;
        while decoder.read_frame().is_ok() {
            frames += 1;
        }
        assert_eq!(frames, finished.frames_written);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        let (session, dir) = session_with(backend.clone());

        session.start().unwrap();
        let err = session.start().unwrap_err();
        assert!(matches!(err, RecordingError::AlreadyActive));

        // Still exactly one camera stream and one output file
        assert_eq!(backend.open_count(), 1);
        assert_eq!(backend.active_streams(), 1);
        let files = std::fs::read_dir(dir.path().join("recordings")).unwrap().count();
        assert_eq!(files, 1);

        session.stop().unwrap();
    }

    #[test]
    fn test_concurrent_starts_admit_one() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        let (session, _dir) = session_with(backend.clone());
        let session = Arc::new(session);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                std::thread::spawn(move || session.start().is_ok())
            })
            .collect();
        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(started, 1);
        assert_eq!(backend.open_count(), 1);
        session.stop().unwrap();
    }

    #[test]
    fn test_status_not_blocked_while_camera_opens() {
        let backend = Arc::new(
            ScriptedBackend::new(8, 6, 25.0).with_open_delay(Duration::from_millis(600)),
        );
        let (session, _dir) = session_with(backend);
        let session = Arc::new(session);

        let starter = {
            let session = session.clone();
            std::thread::spawn(move || session.start())
        };
        std::thread::sleep(Duration::from_millis(100));

        let before = Instant::now();
        let status = session.status();
        assert!(before.elapsed() < Duration::from_millis(200));
        assert_eq!(status.state, RecordingState::Starting);
        assert!(matches!(session.start(), Err(RecordingError::AlreadyActive)));
        assert!(matches!(session.stop(), Err(RecordingError::NotActive)));
        assert!(session.fetch_last_output().is_err());

        starter.join().unwrap().unwrap();
        assert_eq!(session.state(), RecordingState::Recording);
        session.stop().unwrap();
    }

    #[test]
    fn test_stop_when_idle_is_not_active() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        let (session, _dir) = session_with(backend);

        assert!(matches!(session.stop(), Err(RecordingError::NotActive)));

        session.start().unwrap();
        session.stop().unwrap();
        assert!(matches!(session.stop(), Err(RecordingError::NotActive)));
    }

    #[test]
    fn test_camera_unavailable_keeps_session_idle() {
        let backend = Arc::new(ScriptedBackend::unavailable());
        let (session, dir) = session_with(backend);

        let err = session.start().unwrap_err();
        assert!(matches!(err, RecordingError::CameraUnavailable(_)));
        assert_eq!(session.state(), RecordingState::Idle);
        assert!(!dir.path().join("recordings").exists());
    }

    #[test]
    fn test_last_output_only_after_stop() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        let (session, _dir) = session_with(backend);

        assert!(matches!(
            session.fetch_last_output(),
            Err(RecordingError::NotFound(_))
        ));

        let path = session.start().unwrap();
        assert!(matches!(
            session.fetch_last_output(),
            Err(RecordingError::NotFound(_))
        ));

        wait_for_frames(&session, 1);
        session.stop().unwrap();
        assert_eq!(session.fetch_last_output().unwrap(), path);

        // A new recording hides the previous file until it is finalized
        session.start().unwrap();
        assert!(session.fetch_last_output().is_err());
        session.stop().unwrap();
    }

    #[test]
    fn test_read_failures_leave_gaps_without_aborting() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0).failing_every(2));
        let (session, _dir) = session_with(backend.clone());

        session.start().unwrap();
        wait_for_frames(&session, 4);
        assert_eq!(session.state(), RecordingState::Recording);

        let finished = session.stop().unwrap();
        assert!(finished.frames_written >= 4);
        assert!(backend.reads() > finished.frames_written);
    }

    #[test]
    fn test_status_reports_progress() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        let (session, _dir) = session_with(backend);

        let idle = session.status();
        assert_eq!(idle.state, RecordingState::Idle);
        assert!(idle.output_path.is_none());

        let path = session.start().unwrap();
        wait_for_frames(&session, 2);
        let status = session.status();
        assert_eq!(status.state, RecordingState::Recording);
        assert_eq!(status.output_path, Some(path));
        assert!(status.frames_written >= 2);

        session.stop().unwrap();
    }

    #[test]
    fn test_shutdown_finalizes_active_recording() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        let (session, _dir) = session_with(backend.clone());

        session.start().unwrap();
        wait_for_frames(&session, 1);
        session.shutdown();

        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(backend.active_streams(), 0);
        assert!(session.fetch_last_output().is_ok());
    }

    #[test]
    fn test_drop_releases_camera() {
        let backend = Arc::new(ScriptedBackend::new(8, 6, 25.0));
        {
            let (session, _dir) = session_with(backend.clone());
            session.start().unwrap();
            wait_for_frames(&session, 1);
        }
        assert_eq!(backend.active_streams(), 0);
    }
}
