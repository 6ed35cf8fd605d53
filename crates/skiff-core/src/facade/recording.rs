//! Browser recordings stored on the sandbox.

use super::save_bytes;
use crate::api::data;
use crate::error::Result;
use crate::model::{DownloadResult, RecordingInfo};
use crate::sandbox::Sandbox;
use std::path::Path;

/// Recordings outlive the browser session that produced them and are
/// managed independently of it.
#[derive(Debug, Clone)]
pub struct Recordings {
    sandbox: Sandbox,
}

impl Recordings {
    pub(crate) fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub async fn list(&self) -> Result<Vec<RecordingInfo>> {
        self.sandbox
            .live_data()?
            .call_list(data::list_recordings())
            .await
    }

    /// Save a recording to `save_path`. The reported size is the number of
    /// bytes written.
    pub async fn download(&self, filename: &str, save_path: &Path) -> Result<DownloadResult> {
        let request = data::download_recording(filename)?;
        let bytes = self.sandbox.live_data()?.call_bytes(request).await?;
        let size = save_bytes(save_path, &bytes).await?;
        tracing::info!(
            sandbox_id = %self.sandbox.id(),
            filename = %filename,
            path = %save_path.display(),
            size,
            "Recording downloaded"
        );
        Ok(DownloadResult {
            saved_path: save_path.to_path_buf(),
            size,
        })
    }

    pub async fn delete(&self, filename: &str) -> Result<()> {
        let request = data::delete_recording(filename)?;
        self.sandbox.live_data()?.execute(request).await?;
        tracing::info!(sandbox_id = %self.sandbox.id(), filename = %filename, "Recording deleted");
        Ok(())
    }
}
