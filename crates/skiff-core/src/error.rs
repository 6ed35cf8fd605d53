//! Error types for skiff-core.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for skiff-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of remote resource an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Template,
    Sandbox,
    Context,
    File,
    Process,
    Recording,
    BrowserSession,
    AccessToken,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Template => "template",
            Self::Sandbox => "sandbox",
            Self::Context => "context",
            Self::File => "file",
            Self::Process => "process",
            Self::Recording => "recording",
            Self::BrowserSession => "browser session",
            Self::AccessToken => "access token",
        };
        f.write_str(name)
    }
}

/// Coarse classification of an [`Error`], for callers deciding on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Timeout,
    Transport,
    RemoteExecution,
    State,
    Io,
}

/// Errors that can occur during template, sandbox and data-plane operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected locally, before any transport call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced resource does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of the missing resource
        kind: ResourceKind,
        /// Identifier that failed to resolve
        id: String,
    },

    /// A resource with the same name already exists.
    #[error("{kind} already exists: {id}")]
    Conflict {
        /// Kind of the conflicting resource
        kind: ResourceKind,
        /// Identifier that is already taken
        id: String,
    },

    /// The operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Network or protocol failure reported by the transport.
    #[error("transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Human readable description
        message: String,
        /// Server-assigned request id, if any
        request_id: Option<String>,
    },

    /// The remote operation ran but reported a failure.
    #[error("remote execution failed: {message}")]
    RemoteExecution {
        /// Summary of the failure
        message: String,
        /// Diagnostic payload as returned by the server
        payload: serde_json::Value,
    },

    /// Operation attempted against a resource in an incompatible state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Transport { .. } | Self::Json(_) => ErrorKind::Transport,
            Self::RemoteExecution { .. } => ErrorKind::RemoteExecution,
            Self::InvalidState { .. } => ErrorKind::State,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether repeating the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Timeout)
    }

    /// Whether this error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
            request_id: None,
        }
    }

    pub(crate) fn invalid_state(expected: impl Into<String>, actual: impl fmt::Display) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}
