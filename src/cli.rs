//! Command line interface

use crate::config::{DatasetConfig, RecorderConfig, UploadsConfig};
use crate::recorder::WriterKind;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Configuration file (TOML). Defaults to `gesture-capture.toml` if present.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept video uploads from the browser client
    Uploads(UploadsArgs),
    /// Record from a local camera on HTTP command
    Recorder(RecorderArgs),
    /// Capture a hand keypoint dataset from a local camera
    Collect(CollectArgs),
}

#[derive(Args, Debug, Default)]
pub struct UploadsArgs {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Directory receiving uploads
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Directory with the browser client, served at `/`
    #[arg(long)]
    pub static_dir: Option<PathBuf>,
}

impl UploadsArgs {
    pub fn apply(self, config: &mut UploadsConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if self.static_dir.is_some() {
            config.static_dir = self.static_dir;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct RecorderArgs {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Directory receiving recordings
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Camera index
    #[arg(long, short = 'd')]
    pub device: Option<u32>,

    /// Output writer
    #[arg(long, value_enum)]
    pub writer: Option<WriterKind>,
}

impl RecorderArgs {
    pub fn apply(self, config: &mut RecorderConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(device) = self.device {
            config.device_index = device;
        }
        if let Some(writer) = self.writer {
            config.writer = writer;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct CollectArgs {
    /// Dataset root directory
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Gesture labels, comma separated
    #[arg(long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Sequences per label
    #[arg(long)]
    pub sequences: Option<u32>,

    /// Frames per sequence
    #[arg(long)]
    pub sequence_length: Option<u32>,

    /// Camera index
    #[arg(long, short = 'd')]
    pub device: Option<u32>,
}

impl CollectArgs {
    pub fn apply(self, config: &mut DatasetConfig) {
        if let Some(root) = self.root {
            config.root = root;
        }
        if !self.labels.is_empty() {
            config.labels = self.labels;
        }
        if let Some(sequences) = self.sequences {
            config.sequences = sequences;
        }
        if let Some(length) = self.sequence_length {
            config.sequence_length = length;
        }
        if let Some(device) = self.device {
            config.device_index = device;
        }
    }
}
