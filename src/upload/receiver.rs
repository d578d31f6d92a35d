//! Upload receiver
//!
//! Validates an uploaded file name and streams the body to a
//! timestamped file in the configured output directory.

use crate::utils::naming;
use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};

/// Upload failures
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No video file part in the request.")]
    NoFilePart,

    #[error("No selected file.")]
    NoFile,

    #[error("File type not allowed. Must be {allowed}.")]
    UnsupportedType { allowed: String },

    #[error("Server error during save: {0}")]
    StorageError(#[source] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// A file stored by [`PendingUpload::finish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Basename reported back to the client
    pub filename: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Stateless upload handler bound to one output directory
#[derive(Debug, Clone)]
pub struct UploadReceiver {
    output_dir: PathBuf,
    file_prefix: String,
    allowed_extensions: Vec<String>,
}

impl UploadReceiver {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        file_prefix: impl Into<String>,
        allowed_extensions: &[String],
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: file_prefix.into(),
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Check the client file name and return the extension to store under.
    pub fn validate(&self, original_filename: Option<&str>) -> UploadResult<String> {
        let original = match original_filename {
            Some(name) if !name.is_empty() => name,
            _ => return Err(UploadError::NoFile),
        };

        let safe = naming::secure_filename(original);
        let extension = naming::extension_of(&safe).ok_or_else(|| self.unsupported())?;
        if !self
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
        {
            return Err(self.unsupported());
        }

        Ok(extension.to_string())
    }

    /// Validate `original_filename` and claim a new file for its body.
    pub async fn begin(&self, original_filename: Option<&str>) -> UploadResult<PendingUpload> {
        let extension = self.validate(original_filename)?;

        let dir = self.output_dir.clone();
        let prefix = self.file_prefix.clone();
        let (path, file) = tokio::task::spawn_blocking(move || {
            naming::create_unique_file(&dir, &prefix, &extension, &Local::now())
        })
        .await
        .map_err(|e| UploadError::StorageError(io::Error::other(e)))?
        .map_err(UploadError::StorageError)?;

        Ok(PendingUpload {
            path,
            out: BufWriter::new(File::from_std(file)),
            bytes: 0,
            complete: false,
        })
    }

    /// Validate `original_filename` and copy all of `body` to a new file.
    pub async fn receive(
        &self,
        original_filename: Option<&str>,
        mut body: impl AsyncRead + Unpin,
    ) -> UploadResult<StoredUpload> {
        let mut upload = self.begin(original_filename).await?;
        upload.bytes = tokio::io::copy(&mut body, &mut upload.out)
            .await
            .map_err(UploadError::StorageError)?;
        upload.finish().await
    }

    fn unsupported(&self) -> UploadError {
        UploadError::UnsupportedType {
            allowed: join_alternatives(&self.allowed_extensions),
        }
    }
}

/// An upload whose file exists but whose body is still arriving.
///
/// Dropping it before [`finish`](Self::finish) removes the partial file.
#[derive(Debug)]
pub struct PendingUpload {
    path: PathBuf,
    out: BufWriter<File>,
    bytes: u64,
    complete: bool,
}

impl PendingUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one chunk of the body
    pub async fn write(&mut self, chunk: &[u8]) -> UploadResult<()> {
        self.out
            .write_all(chunk)
            .await
            .map_err(UploadError::StorageError)?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush the body to disk and keep the file
    pub async fn finish(mut self) -> UploadResult<StoredUpload> {
        self.out.flush().await.map_err(UploadError::StorageError)?;
        self.complete = true;

        let filename = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!("Upload stored: {:?} ({} bytes)", self.path, self.bytes);
        Ok(StoredUpload {
            filename,
            path: self.path.clone(),
            bytes: self.bytes,
        })
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.complete {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove partial upload {:?}: {}", self.path, e);
        } else {
            tracing::debug!("Removed partial upload {:?}", self.path);
        }
    }
}

/// `a`, `a or b`, `a, b, or c`
fn join_alternatives(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} or {b}"),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn receiver(dir: &Path) -> UploadReceiver {
        let allowed = ["webm", "mp4", "ogg"].map(String::from);
        UploadReceiver::new(dir.join("client_recordings"), "client_recording", &allowed)
    }

    #[tokio::test]
    async fn test_allowed_extensions_any_case() {
        let dir = tempdir().unwrap();
        let receiver = receiver(dir.path());

        for name in ["a.webm", "b.WEBM", "c.mp4", "d.Mp4", "e.ogg", "f.OGG"] {
            let stored = receiver.receive(Some(name), &b"data"[..]).await.unwrap();
            let ext = naming::extension_of(name).unwrap();
            assert!(stored.filename.starts_with("client_recording_"));
            assert!(stored.filename.ends_with(&format!(".{ext}")), "{}", stored.filename);
            assert_eq!(std::fs::read(&stored.path).unwrap(), b"data");
        }
    }

    #[tokio::test]
    async fn test_other_extensions_rejected() {
        let dir = tempdir().unwrap();
        let receiver = receiver(dir.path());

        for name in ["clip.avi", "clip.webm.exe", "clip", "clip.", "mp4", "archive.tar.gz"] {
            let err = receiver.receive(Some(name), &b"data"[..]).await.unwrap_err();
            assert!(matches!(err, UploadError::UnsupportedType { .. }), "{name}");
        }
        assert!(!dir.path().join("client_recordings").exists());
    }

    #[tokio::test]
    async fn test_missing_filename() {
        let dir = tempdir().unwrap();
        let receiver = receiver(dir.path());

        assert!(matches!(
            receiver.receive(None, &b""[..]).await,
            Err(UploadError::NoFile)
        ));
        assert!(matches!(
            receiver.receive(Some(""), &b""[..]).await,
            Err(UploadError::NoFile)
        ));
    }

    #[tokio::test]
    async fn test_traversal_is_sanitised() {
        let dir = tempdir().unwrap();
        let receiver = receiver(dir.path());

        let stored = receiver
            .receive(Some("../../outside/clip.webm"), &b"x"[..])
            .await
            .unwrap();
        assert_eq!(stored.path.parent().unwrap(), receiver.output_dir());
    }

    #[test]
    fn test_unsupported_message() {
        let dir = tempdir().unwrap();
        let err = receiver(dir.path()).validate(Some("x.avi")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "File type not allowed. Must be webm, mp4, or ogg."
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_uploads_never_overwrite() {
        let dir = tempdir().unwrap();
        let receiver = Arc::new(receiver(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    let body = format!("upload-{i}");
                    let name = format!("clip_{i}.webm");
                    let stored = receiver
                        .receive(Some(name.as_str()), body.as_bytes())
                        .await
                        .unwrap();
                    (stored, body)
                })
            })
            .collect();

        let mut names = std::collections::HashSet::new();
        for handle in handles {
            let (stored, body) = handle.await.unwrap();
            assert!(names.insert(stored.filename.clone()));
            assert_eq!(std::fs::read_to_string(&stored.path).unwrap(), body);
        }
        assert_eq!(names.len(), 16);
    }

    #[tokio::test]
    async fn test_chunks_are_appended_in_order() {
        let dir = tempdir().unwrap();
        let receiver = receiver(dir.path());

        let mut upload = receiver.begin(Some("clip.ogg")).await.unwrap();
        upload.write(b"first-").await.unwrap();
        upload.write(b"second").await.unwrap();
        let stored = upload.finish().await.unwrap();

        assert_eq!(stored.bytes, 12);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"first-second");
    }

    #[tokio::test]
    async fn test_unfinished_upload_is_removed() {
        let dir = tempdir().unwrap();
        let receiver = receiver(dir.path());

        let mut upload = receiver.begin(Some("clip.webm")).await.unwrap();
        upload.write(b"partial").await.unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());

        drop(upload);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(receiver.output_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_storage_error_when_dir_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("client_recordings");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let err = receiver(dir.path())
            .receive(Some("clip.mp4"), &b"x"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::StorageError(_)));
        assert!(err.to_string().starts_with("Server error during save: "));
    }
}
