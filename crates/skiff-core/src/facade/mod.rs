//! Capability facades over the sandbox data endpoint.
//!
//! Each facade is a thin typed layer over the request builders in
//! `api::data`. Facades keep a handle to their sandbox and check its last
//! observed status on every call.

mod browser;
mod context;
mod file;
mod filesystem;
mod process;
mod recording;

pub use browser::Browser;
pub use context::{Context, Contexts, ExecuteOptions, DEFAULT_CONTEXT_CWD};
pub use file::{Files, WriteOptions};
pub use filesystem::{FileSystem, DEFAULT_DIR_MODE};
pub use process::Processes;
pub use recording::Recordings;

use crate::error::Result;
use bytes::Bytes;
use std::path::Path;

/// Write downloaded bytes to `path`, creating missing parent directories.
/// Returns the number of bytes written.
pub(crate) async fn save_bytes(path: &Path, bytes: &Bytes) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(bytes.len() as u64)
}
