//! Video file writers
//!
//! A writer is bound to one output path, frame size and rate. Frames are
//! appended one at a time; `finish` flushes and closes the container.

use crate::capture::{CameraProperties, Frame};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

/// Writer-related errors
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Y4M error: {0}")]
    Y4m(String),

    #[error("Frame is {width}x{height} ({len} bytes), writer expects {expected_width}x{expected_height}")]
    FrameSize {
        width: u32,
        height: u32,
        len: usize,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("Writer already finished")]
    Finished,
}

/// Available writer implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WriterKind {
    /// Encode through an ffmpeg child process
    #[default]
    Ffmpeg,
    /// Uncompressed YUV4MPEG2
    Y4m,
}

/// An open output stream
pub trait VideoWriter: Send {
    /// Append one frame
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriterError>;

    /// Frames appended so far
    fn frames_written(&self) -> u64;

    /// Flush and close the container, returning its path
    fn finish(self: Box<Self>) -> Result<PathBuf, WriterError>;
}

/// Opens writers for new recordings
pub trait VideoWriterFactory: Send + Sync {
    /// File extension of the produced container (without the dot)
    fn extension(&self) -> &str;

    fn create(
        &self,
        path: &Path,
        properties: &CameraProperties,
    ) -> Result<Box<dyn VideoWriter>, WriterError>;
}

fn check_frame(frame: &Frame, width: u32, height: u32) -> Result<(), WriterError> {
    if frame.width != width || frame.height != height || !frame.is_complete() {
        return Err(WriterError::FrameSize {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
            expected_width: width,
            expected_height: height,
        });
    }
    Ok(())
}

/// Settings for ffmpeg-encoded output
#[derive(Debug, Clone)]
pub struct FfmpegWriterFactory {
    pub ffmpeg_path: String,
    pub codec: String,
    pub extension: String,
}

impl FfmpegWriterFactory {
    pub fn new(ffmpeg_path: impl Into<String>, codec: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            codec: codec.into(),
            extension: extension.into(),
        }
    }
}

/// Build the ffmpeg argument list for raw RGB24 frames on stdin
fn ffmpeg_args(codec: &str, properties: &CameraProperties, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgb24",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend([
        "-video_size".to_string(),
        format!("{}x{}", properties.width, properties.height),
        "-framerate".to_string(),
        format!("{}", properties.fps),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        codec.to_string(),
        // Widest player compatibility
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);

    let is_mp4_family = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "mp4" | "mov" | "m4v"));
    if is_mp4_family {
        // Move moov atom to start for streaming
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    args.push(output.to_string_lossy().to_string());
    args
}

impl VideoWriterFactory for FfmpegWriterFactory {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn create(
        &self,
        path: &Path,
        properties: &CameraProperties,
    ) -> Result<Box<dyn VideoWriter>, WriterError> {
        let mut process = Command::new(&self.ffmpeg_path)
            .args(ffmpeg_args(&self.codec, properties, path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WriterError::Encoder(format!("Failed to start ffmpeg: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WriterError::Encoder("Failed to capture ffmpeg stdin".to_string()))?;

        tracing::info!(
            "Started ffmpeg encoder: {}x{} @ {}fps, codec={}, output: {:?}",
            properties.width,
            properties.height,
            properties.fps,
            self.codec,
            path
        );

        Ok(Box::new(FfmpegWriter {
            process: Some(process),
            stdin: Some(stdin),
            output_path: path.to_path_buf(),
            width: properties.width,
            height: properties.height,
            frame_count: 0,
        }))
    }
}

/// Pipes raw frames into an ffmpeg encoder
pub struct FfmpegWriter {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    output_path: PathBuf,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl VideoWriter for FfmpegWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriterError> {
        check_frame(frame, self.width, self.height)?;
        let stdin = self.stdin.as_mut().ok_or(WriterError::Finished)?;
        stdin.write_all(&frame.data)?;
        self.frame_count += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frame_count
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf, WriterError> {
        // Closing stdin signals EOF
        drop(self.stdin.take());

        let process = self.process.take().ok_or(WriterError::Finished)?;
        let output = process.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WriterError::Encoder(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(
            "ffmpeg finished: {} frames, output: {:?}",
            self.frame_count,
            self.output_path
        );
        Ok(self.output_path.clone())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.wait() {
                tracing::warn!("Failed to wait for ffmpeg: {}", e);
            }
        }
    }
}

/// Uncompressed YUV4MPEG2 output, 4:4:4 full range
#[derive(Debug, Clone, Copy, Default)]
pub struct Y4mWriterFactory;

/// Express a frame rate as a y4m ratio
fn fps_ratio(fps: f64) -> (usize, usize) {
    if fps.fract().abs() < 1e-9 {
        (fps as usize, 1)
    } else {
        ((fps * 1000.0).round() as usize, 1000)
    }
}

impl VideoWriterFactory for Y4mWriterFactory {
    fn extension(&self) -> &str {
        "y4m"
    }

    fn create(
        &self,
        path: &Path,
        properties: &CameraProperties,
    ) -> Result<Box<dyn VideoWriter>, WriterError> {
        let file = File::create(path)?;
        let sync_handle = file.try_clone()?;
        let (num, den) = fps_ratio(properties.fps);

        let encoder = y4m::encode(
            properties.width as usize,
            properties.height as usize,
            y4m::Ratio::new(num, den),
        )
        .with_colorspace(y4m::Colorspace::C444)
        .write_header(file)
        .map_err(|e| WriterError::Y4m(format!("{:?}", e)))?;

        let plane_len = properties.width as usize * properties.height as usize;
        Ok(Box::new(Y4mWriter {
            encoder: Some(encoder),
            sync_handle,
            output_path: path.to_path_buf(),
            width: properties.width,
            height: properties.height,
            planes: [
                vec![0; plane_len],
                vec![0; plane_len],
                vec![0; plane_len],
            ],
            frame_count: 0,
        }))
    }
}

pub struct Y4mWriter {
    encoder: Option<y4m::Encoder<File>>,
    sync_handle: File,
    output_path: PathBuf,
    width: u32,
    height: u32,
    planes: [Vec<u8>; 3],
    frame_count: u64,
}

/// BT.601 full-range RGB to YUV
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let v = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    (clamp(y), clamp(u), clamp(v))
}

impl VideoWriter for Y4mWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriterError> {
        check_frame(frame, self.width, self.height)?;

        let [y_plane, u_plane, v_plane] = &mut self.planes;
        for (i, px) in frame.data.chunks_exact(Frame::BYTES_PER_PIXEL).enumerate() {
            let (y, u, v) = rgb_to_yuv(px[0], px[1], px[2]);
            y_plane[i] = y;
            u_plane[i] = u;
            v_plane[i] = v;
        }

        let encoder = self.encoder.as_mut().ok_or(WriterError::Finished)?;
        let out = y4m::Frame::new(
            [&self.planes[0][..], &self.planes[1][..], &self.planes[2][..]],
            None,
        );
        encoder
            .write_frame(&out)
            .map_err(|e| WriterError::Y4m(format!("{:?}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frame_count
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf, WriterError> {
        drop(self.encoder.take().ok_or(WriterError::Finished)?);
        self.sync_handle.sync_all()?;

        tracing::info!(
            "Y4M writer finished: {} frames, output: {:?}",
            self.frame_count,
            self.output_path
        );
        Ok(self.output_path.clone())
    }
}

/// Writer factory for the configured kind
pub fn writer_factory(
    kind: WriterKind,
    ffmpeg_path: &str,
    codec: &str,
    extension: &str,
) -> Arc<dyn VideoWriterFactory> {
    match kind {
        WriterKind::Ffmpeg => Arc::new(FfmpegWriterFactory::new(ffmpeg_path, codec, extension)),
        WriterKind::Y4m => Arc::new(Y4mWriterFactory),
    }
}
