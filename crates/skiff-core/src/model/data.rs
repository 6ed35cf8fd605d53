//! Records returned by sandbox data-plane operations.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Language of a code execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    #[default]
    Python,
    #[serde(alias = "js")]
    JavaScript,
}

impl fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => f.write_str("python"),
            Self::JavaScript => f.write_str("javascript"),
        }
    }
}

/// Server-side execution context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextInfo {
    #[serde(alias = "contextId")]
    pub id: String,
    pub language: CodeLanguage,
    pub cwd: Option<String>,
    pub created_at: Option<String>,
}

/// One output item of a code execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOutput {
    /// `stdout`, `stderr`, `result` or `display`.
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Exception raised by executed code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    pub traceback: Vec<String>,
}

/// Outcome of running code in a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionResult {
    pub context_id: Option<String>,
    pub outputs: Vec<ExecutionOutput>,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    fn collect(&self, kind: &str) -> String {
        self.outputs
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.text.as_str())
            .collect()
    }

    pub fn stdout(&self) -> String {
        self.collect("stdout")
    }

    pub fn stderr(&self) -> String {
        self.collect("stderr")
    }

    /// Text of the final expression value, if any.
    pub fn text(&self) -> Option<String> {
        self.outputs
            .iter()
            .rev()
            .find(|o| o.kind == "result")
            .map(|o| o.text.clone())
    }

    /// Convert a reported exception into [`Error::RemoteExecution`].
    pub fn into_result(self) -> Result<Self> {
        match &self.error {
            None => Ok(self),
            Some(err) => Err(Error::RemoteExecution {
                message: format!("{}: {}", err.name, err.value),
                payload: serde_json::to_value(err)?,
            }),
        }
    }
}

/// Outcome of a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into [`Error::RemoteExecution`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(Error::RemoteExecution {
            message: format!("command exited with code {}", self.exit_code),
            payload: serde_json::to_value(&self)?,
        })
    }
}

/// Process running inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub pid: String,
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub status: Option<String>,
    pub exit_code: Option<i32>,
}

/// File content read from a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub encoding: Option<String>,
}

/// Directory listing entry. Nested entries are present when a depth
/// greater than one was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileStat {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub mode: Option<String>,
    pub modified_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadResult {
    pub path: String,
    pub size: u64,
}

/// A file saved to the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub saved_path: PathBuf,
    /// Number of bytes written to `saved_path`.
    pub size: u64,
}

/// Browser recording stored on the sandbox.
///
/// The filename is an opaque identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingInfo {
    pub filename: String,
    pub size: Option<u64>,
    pub created_at: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}
