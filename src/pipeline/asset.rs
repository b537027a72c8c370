//! Scoped on-disk storage for a run's photo.
//!
//! Every `ImageAsset` is a named temp file under the scratch directory.
//! The file is removed when the asset is released or dropped, whichever
//! comes first, so every exit path of a run cleans up exactly once.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Directory fetched photos are written to.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Write `bytes` to a fresh temp file and hand back its owner.
    pub async fn store(
        &self,
        bytes: Vec<u8>,
        content_type: impl Into<String>,
    ) -> std::io::Result<ImageAsset> {
        let root = self.root.clone();
        let content_type = content_type.into();
        let suffix = extension_for(&content_type);

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            let mut file = tempfile::Builder::new()
                .prefix("meal-")
                .suffix(suffix)
                .tempfile_in(&root)?;
            file.write_all(&bytes)?;
            file.flush()?;
            debug!(path = %file.path().display(), len = bytes.len(), "Stored photo");
            Ok::<_, std::io::Error>(ImageAsset {
                file: Some(file),
                content_type,
                len: bytes.len(),
            })
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        _ => ".jpg",
    }
}

/// A run's photo on disk.
#[derive(Debug)]
pub struct ImageAsset {
    file: Option<NamedTempFile>,
    content_type: String,
    len: usize,
}

impl ImageAsset {
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the stored bytes back.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self.path() {
            Some(path) => tokio::fs::read(path).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "image asset already released",
            )),
        }
    }

    /// Delete the file now. Failures are logged; the run carries on.
    pub fn release(mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            match file.close() {
                Ok(()) => debug!(path = %path.display(), "Released photo"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove photo"),
            }
        }
    }
}
