//! On-disk dataset layout
//!
//! `<root>/<label>/<sequence>/<frame>.npy`, one feature vector per file.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Identifies one stored sample
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub label: String,
    pub sequence: u32,
    pub frame: u32,
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.label, self.sequence, self.frame)
    }
}

#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
    labels: Vec<String>,
    sequences: u32,
    sequence_length: u32,
}

impl DatasetLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        labels: Vec<String>,
        sequences: u32,
        sequence_length: u32,
    ) -> Self {
        Self {
            root: root.into(),
            labels,
            sequences,
            sequence_length,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn sequences(&self) -> u32 {
        self.sequences
    }

    pub fn sequence_length(&self) -> u32 {
        self.sequence_length
    }

    /// Number of samples a full run writes
    pub fn total_samples(&self) -> u64 {
        self.labels.len() as u64 * self.sequences as u64 * self.sequence_length as u64
    }

    pub fn sequence_dir(&self, label: &str, sequence: u32) -> PathBuf {
        self.root.join(label).join(sequence.to_string())
    }

    pub fn sample_path(&self, key: &SampleKey) -> PathBuf {
        self.sequence_dir(&key.label, key.sequence)
            .join(format!("{}.npy", key.frame))
    }

    /// Create every `<root>/<label>/<sequence>` directory.
    ///
    /// Existing directories are left alone.
    pub fn prepare(&self) -> io::Result<()> {
        for label in &self.labels {
            for sequence in 0..self.sequences {
                std::fs::create_dir_all(self.sequence_dir(label, sequence))?;
            }
        }
        tracing::debug!(
            "Dataset directories ready under {:?} ({} labels x {} sequences)",
            self.root,
            self.labels.len(),
            self.sequences
        );
        Ok(())
    }

    /// All keys in label, sequence, frame order
    pub fn keys(&self) -> impl Iterator<Item = SampleKey> + '_ {
        self.labels.iter().flat_map(move |label| {
            (0..self.sequences).flat_map(move |sequence| {
                (0..self.sequence_length).map(move |frame| SampleKey {
                    label: label.clone(),
                    sequence,
                    frame,
                })
            })
        })
    }
}
