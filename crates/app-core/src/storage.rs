//! Provider-agnostic blob storage with resumable, progress-reporting uploads.

use tokio::sync::watch;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create directory: {0}")]
    CreateDirFailed(#[source] std::io::Error),

    #[error("Failed to write file: {0}")]
    WriteFileFailed(#[source] std::io::Error),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Upload interrupted after {written} of {total} bytes")]
    Interrupted { written: u64, total: u64 },

    #[error("Object not found: {0}")]
    NotFound(String),
}

/// A stored object, as returned by a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle {
    pub path: String,
    pub size: u64,
}

/// Publishes upload progress as a whole percentage in `0..=100`.
///
/// Values only ever move forward; a late or repeated report is ignored.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<u8>,
}

impl ProgressReporter {
    pub fn new(tx: watch::Sender<u8>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, watch::Receiver<u8>) {
        let (tx, rx) = watch::channel(0);
        (Self::new(tx), rx)
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        self.tx.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    pub fn report_bytes(&self, written: u64, total: u64) {
        if total == 0 {
            self.report(100);
            return;
        }
        let percent = (written.min(total) * 100 / total) as u8;
        self.report(percent);
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` at `path`, reporting progress as bytes are committed.
    async fn upload_resumable(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        progress: ProgressReporter,
    ) -> Result<UploadHandle, StorageError>;

    /// Resolves a retrievable reference (URL) for a completed upload.
    async fn download_reference(&self, handle: &UploadHandle) -> Result<String, StorageError>;
}

fn validate_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(feature = "storage-local")]
pub mod local {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use tokio::fs;
    use tokio::io::AsyncWriteExt;

    use super::*;

    const CHUNK_SIZE: usize = 64 * 1024;

    /// A `BlobStore` that writes objects under a directory on the local disk
    /// and serves them from `base_url`.
    #[derive(Clone)]
    pub struct LocalBlobStore {
        base_path: PathBuf,
        base_url: String,
    }

    impl LocalBlobStore {
        pub fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
            let base_url: String = base_url.into();
            Self { base_path: base_path.into(), base_url: base_url.trim_end_matches('/').to_string() }
        }

        pub fn base_path(&self) -> &Path {
            &self.base_path
        }

        /// The URL path objects are published under, `/` when `base_url` is a
        /// bare origin.
        pub fn mount_path(&self) -> &str {
            let without_scheme = self.base_url.split_once("://").map_or(self.base_url.as_str(), |(_, rest)| rest);
            match without_scheme.find('/') {
                Some(start) => &without_scheme[start..],
                None => "/",
            }
        }
    }

    #[async_trait]
    impl BlobStore for LocalBlobStore {
        async fn upload_resumable(
            &self,
            path: &str,
            data: Vec<u8>,
            content_type: &str,
            progress: ProgressReporter,
        ) -> Result<UploadHandle, StorageError> {
            validate_path(path)?;
            let file_path = self.base_path.join(path);

            if let Some(parent_dir) = file_path.parent() {
                fs::create_dir_all(parent_dir).await.map_err(StorageError::CreateDirFailed)?;
            }

            let total = data.len() as u64;
            let mut file = fs::File::create(&file_path).await.map_err(StorageError::WriteFileFailed)?;
            let mut written = 0u64;

            progress.report_bytes(0, total);
            for chunk in data.chunks(CHUNK_SIZE) {
                if let Err(e) = file.write_all(chunk).await {
                    tracing::warn!(path, written, total, "upload interrupted: {}", e);
                    return Err(StorageError::Interrupted { written, total });
                }
                written += chunk.len() as u64;
                progress.report_bytes(written, total);
            }
            file.flush().await.map_err(StorageError::WriteFileFailed)?;
            progress.report(100);

            tracing::debug!(path, content_type, size = total, "object stored");
            Ok(UploadHandle { path: path.to_string(), size: total })
        }

        async fn download_reference(&self, handle: &UploadHandle) -> Result<String, StorageError> {
            validate_path(&handle.path)?;
            let exists = fs::try_exists(self.base_path.join(&handle.path)).await.unwrap_or(false);
            if !exists {
                return Err(StorageError::NotFound(handle.path.clone()));
            }
            Ok(format!("{}/{}", self.base_url, handle.path))
        }
    }
}
