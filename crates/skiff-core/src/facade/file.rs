//! Text file read and write.

use crate::api::data;
use crate::error::Result;
use crate::model::FileContent;
use crate::sandbox::Sandbox;

/// Options for [`Files::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Octal permission bits, e.g. `"644"`.
    pub mode: String,
    pub encoding: String,
    /// Create missing parent directories.
    pub create_dir: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode: "644".into(),
            encoding: "utf-8".into(),
            create_dir: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Files {
    sandbox: Sandbox,
}

impl Files {
    pub(crate) fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub async fn read(&self, path: &str) -> Result<FileContent> {
        let request = data::read_file(path)?;
        tracing::debug!(sandbox_id = %self.sandbox.id(), path = %path, "Reading file");
        let content: FileContent = self.sandbox.live_data()?.call(request).await?;
        tracing::trace!(sandbox_id = %self.sandbox.id(), size = content.content.len(), "File read");
        Ok(content)
    }

    /// Write a file. With `create_dir` unset, a missing parent directory
    /// fails with [`Error::NotFound`](crate::Error::NotFound).
    pub async fn write(&self, path: &str, content: &str, options: WriteOptions) -> Result<()> {
        let request = data::write_file(
            path,
            content,
            &options.mode,
            &options.encoding,
            options.create_dir,
        )?;
        tracing::debug!(
            sandbox_id = %self.sandbox.id(),
            path = %path,
            content_len = content.len(),
            "Writing file"
        );
        self.sandbox.live_data()?.execute(request).await
    }
}
