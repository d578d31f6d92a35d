//! Server-side recording
//!
//! This module implements the camera recording lifecycle:
//! - RecordingSession owning the single recording slot
//! - VideoWriter backends (ffmpeg pipe, Y4M) for the output file

pub mod session;
pub mod state;
pub mod writer;

pub use session::{RecordingError, RecordingResult, RecordingSession, SessionOptions};
pub use state::{FinishedRecording, RecordingState, RecordingStatus};
pub use writer::{writer_factory, VideoWriter, VideoWriterFactory, WriterError, WriterKind};
