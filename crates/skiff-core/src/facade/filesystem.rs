//! Filesystem operations and file transfer.

use super::save_bytes;
use crate::api::data;
use crate::error::{Error, Result};
use crate::model::{DownloadResult, FileEntry, FileStat, UploadResult};
use crate::sandbox::Sandbox;
use bytes::Bytes;
use std::path::Path;
use std::time::Instant;

/// Permission bits for new directories when none are given.
pub const DEFAULT_DIR_MODE: &str = "0755";

#[derive(Debug, Clone)]
pub struct FileSystem {
    sandbox: Sandbox,
}

impl FileSystem {
    pub(crate) fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// List a directory. Without a path the server's working directory is
    /// listed; `depth` greater than one returns nested entries.
    pub async fn list(&self, path: Option<&str>, depth: Option<u32>) -> Result<Vec<FileEntry>> {
        let request = data::list_directory(path, depth)?;
        let entries: Vec<FileEntry> = self.sandbox.live_data()?.call_list(request).await?;
        tracing::trace!(sandbox_id = %self.sandbox.id(), count = entries.len(), "Directory listed");
        Ok(entries)
    }

    pub async fn stat(&self, path: &str) -> Result<FileStat> {
        self.sandbox.live_data()?.call(data::stat(path)?).await
    }

    /// Create a directory. Without `parents`, a missing parent fails with
    /// [`Error::NotFound`].
    pub async fn mkdir(&self, path: &str, parents: bool, mode: Option<&str>) -> Result<()> {
        let request = data::mkdir(path, parents, mode.unwrap_or(DEFAULT_DIR_MODE))?;
        self.sandbox.live_data()?.execute(request).await
    }

    pub async fn move_path(&self, source: &str, destination: &str) -> Result<()> {
        let request = data::move_path(source, destination)?;
        self.sandbox.live_data()?.execute(request).await
    }

    pub async fn remove(&self, path: &str) -> Result<()> {
        self.sandbox.live_data()?.execute(data::remove(path)?).await
    }

    /// Upload a local file to `remote_path`.
    pub async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<UploadResult> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::Validation(format!("not a file path: {}", local_path.display()))
            })?
            .to_string();
        // Validate the remote side before touching the local file.
        data::upload(remote_path, &file_name, Bytes::new())?;
        let api = self.sandbox.live_data()?;

        let bytes = Bytes::from(tokio::fs::read(local_path).await?);
        let size = bytes.len() as u64;
        let start = Instant::now();
        tracing::debug!(sandbox_id = %self.sandbox.id(), local = %local_path.display(), remote = %remote_path, size, "Uploading file");

        let request = data::upload(remote_path, &file_name, bytes)?;
        let result: Option<UploadResult> = api.call(request).await?;
        tracing::debug!(
            sandbox_id = %self.sandbox.id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upload completed"
        );
        Ok(result.unwrap_or(UploadResult {
            path: remote_path.to_string(),
            size,
        }))
    }

    /// Download `remote_path` into `local_path`, creating local parent
    /// directories as needed.
    pub async fn download(&self, remote_path: &str, local_path: &Path) -> Result<DownloadResult> {
        let request = data::download(remote_path)?;
        let bytes = self.sandbox.live_data()?.call_bytes(request).await?;
        let size = save_bytes(local_path, &bytes).await?;
        tracing::debug!(sandbox_id = %self.sandbox.id(), remote = %remote_path, size, "Download saved");
        Ok(DownloadResult {
            saved_path: local_path.to_path_buf(),
            size,
        })
    }
}
