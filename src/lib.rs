//! Gesture capture - video uploads, camera recording and keypoint datasets.
//!
//! This is the main library crate for the `gesture-capture` binary.
//! It provides the HTTP services, the recording session and the dataset
//! capture driver.

pub mod capture;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod recorder;
pub mod server;
pub mod upload;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Context;
use capture::{CameraHandle, NokhwaBackend};
use clap::Parser;
use cli::{Cli, Command};
use config::{Config, DatasetConfig, RecorderConfig, UploadsConfig};
use dataset::{CaptureDatasetDriver, CaptureEvent, DatasetLayout, SidecarDetector};
use parking_lot::Mutex;
use recorder::RecordingSession;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gesture_capture_lib=debug,gesture_capture=debug,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Parse the command line and run the selected service
pub fn run() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    tracing::info!("Starting gesture-capture v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Uploads(args) => {
            args.apply(&mut config.uploads);
            run_uploads(&config.uploads)
        }
        Command::Recorder(args) => {
            args.apply(&mut config.recorder);
            run_recorder(&config.recorder)
        }
        Command::Collect(args) => {
            args.apply(&mut config.dataset);
            run_collect(&config.dataset, config.recorder.read_timeout())
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn run_uploads(config: &UploadsConfig) -> anyhow::Result<()> {
    tracing::info!("Storing uploads in {:?}", config.output_dir);
    let router = server::upload::router(config);
    runtime()?.block_on(server::serve(config.bind, router, server::shutdown_signal()))
}

fn run_recorder(config: &RecorderConfig) -> anyhow::Result<()> {
    for camera in capture::list_cameras() {
        tracing::info!("Found camera {}: {}", camera.index, camera.name);
    }

    let backend = Arc::new(NokhwaBackend::new(config.read_timeout()));
    let camera =
        CameraHandle::new(config.device_index, backend).with_default_fps(config.default_fps);
    let writers = recorder::writer_factory(
        config.writer,
        &config.ffmpeg_path,
        &config.codec,
        &config.extension,
    );
    let session = Arc::new(RecordingSession::new(
        config.session_options(),
        Arc::new(Mutex::new(camera)),
        writers,
    ));

    tracing::info!(
        "Recording from camera {} into {:?} ({:?} writer)",
        config.device_index,
        config.output_dir,
        config.writer
    );
    let router = server::recording::router(session.clone());
    let result = runtime()?.block_on(server::serve(config.bind, router, server::shutdown_signal()));

    // Finalize anything still recording before exit
    session.shutdown();
    result
}

fn run_collect(config: &DatasetConfig, read_timeout: Duration) -> anyhow::Result<()> {
    let layout = DatasetLayout::new(
        config.root.clone(),
        config.labels.clone(),
        config.sequences,
        config.sequence_length,
    );
    let camera = CameraHandle::new(
        config.device_index,
        Arc::new(NokhwaBackend::new(read_timeout)),
    );
    let detector = SidecarDetector::spawn(&config.detector_command)
        .context("Failed to start landmark detector")?;

    let mut driver = CaptureDatasetDriver::new(layout, camera, Box::new(detector))
        .with_sequence_pause(Duration::from_millis(config.sequence_pause_ms));

    let rt = runtime()?;
    let cancel = driver.cancel_flag();
    rt.spawn(async move {
        server::shutdown_signal().await;
        cancel.store(true, Ordering::SeqCst);
    });

    tracing::info!(
        "Collecting {} samples into {:?}",
        driver.layout().total_samples(),
        config.root
    );
    let summary = driver.run(|event| match event {
        CaptureEvent::SequenceStarted { label, sequence } => {
            tracing::info!("STARTING COLLECTION: {} video {}", label, sequence);
        }
        CaptureEvent::FrameStored {
            key, hand_detected, ..
        } => {
            tracing::debug!("Stored {} (hand detected: {})", key, hand_detected);
        }
    })?;

    tracing::info!(
        "Collected {} samples ({:?})",
        summary.frames_written,
        summary.stop_reason
    );
    Ok(())
}
