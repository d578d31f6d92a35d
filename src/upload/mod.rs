//! Browser upload handling

pub mod receiver;

pub use receiver::{StoredUpload, UploadError, UploadReceiver, UploadResult};
