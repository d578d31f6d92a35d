//! Gesture dataset capture
//!
//! This module turns camera frames into stored training samples:
//! - HandDetector producing landmark sets for a frame
//! - extract() flattening the right hand into a FeatureVector
//! - DatasetLayout mapping (label, sequence, frame) keys to `.npy` files
//! - CaptureDatasetDriver running the whole enumeration

pub mod detector;
pub mod driver;
pub mod extractor;
pub mod layout;

pub use detector::{DetectionResult, DetectorError, HandDetector, Landmark, SidecarDetector};
pub use driver::{
    CaptureDatasetDriver, CaptureEvent, CollectionSummary, DatasetError, StopReason,
};
pub use extractor::{extract, FeatureVector, FEATURE_LEN, LANDMARK_COUNT};
pub use layout::{DatasetLayout, SampleKey};
