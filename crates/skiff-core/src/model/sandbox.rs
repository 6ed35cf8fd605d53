//! Sandbox descriptors, status state machine and creation input.

use crate::error::{Error, Result};
use crate::model::TemplateType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned sandbox identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxId(String);

impl SandboxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SandboxId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SandboxId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for SandboxId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a sandbox.
///
/// ```text
/// Creating ─▶ Running ⇄ Idle ─▶ Stopping ─▶ Stopped ─▶ Deleting ─▶ Deleted
///                 └───────┴──────────────────▲
///                  (idle timeout / TTL, server-enforced)
/// any non-terminal state ─▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxStatus {
    Creating,
    Running,
    Idle,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
    Failed,
    /// A status this client does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl SandboxStatus {
    /// Whether data-plane operations may be issued.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Creating | Self::Running | Self::Idle)
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted | Self::Failed)
    }

    /// Whether the server may legitimately report `next` after `self`.
    ///
    /// Observing the same status twice is always allowed. `Unknown` on
    /// either side is accepted since nothing can be concluded from it.
    pub fn can_transition_to(&self, next: SandboxStatus) -> bool {
        use SandboxStatus::*;
        if *self == next || *self == Unknown || next == Unknown {
            return true;
        }
        match (self, next) {
            (Deleted | Failed, _) => false,
            (_, Failed) => true,
            (Creating, Running) => true,
            (Running, Idle) | (Idle, Running) => true,
            (Running | Idle, Stopping | Stopped) => true,
            (Stopping, Stopped) => true,
            (Stopped, Deleting) => true,
            (Deleting, Deleted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creating => "Creating",
            Self::Running => "Running",
            Self::Idle => "Idle",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Sandbox descriptor as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxInfo {
    pub sandbox_id: String,
    pub template_name: Option<String>,
    pub template_id: Option<String>,
    pub template_type: Option<TemplateType>,
    pub status: SandboxStatus,
    pub sandbox_idle_timeout_seconds: Option<u64>,
    #[serde(rename = "sandboxTTLInSeconds")]
    pub sandbox_ttl_in_seconds: Option<u64>,
    pub created_at: Option<String>,
    pub last_updated_at: Option<String>,
    pub status_reason: Option<String>,
}

impl SandboxInfo {
    /// Creation timestamp, if the server reported a parseable one.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasMountPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_tls: Option<bool>,
    pub mount_dir: String,
    pub server_addr: String,
}

/// NAS file systems mounted into one sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    pub mount_points: Vec<NasMountPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssMountPoint {
    pub bucket_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub mount_dir: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Object-storage buckets mounted into one sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssMountConfig {
    pub mount_points: Vec<OssMountPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolarFsMountPoint {
    pub instance_id: String,
    pub mount_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolarFsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    pub mount_points: Vec<PolarFsMountPoint>,
}

/// Input for creating a sandbox.
///
/// Timeout overrides apply to this instance only, never to the template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxInput {
    pub template_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_idle_timeout_seconds: Option<u64>,
    #[serde(rename = "sandboxTTLInSeconds", skip_serializing_if = "Option::is_none")]
    pub sandbox_ttl_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_config: Option<NasConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oss_mount_config: Option<OssMountConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polar_fs_config: Option<PolarFsConfig>,
}

impl SandboxInput {
    pub fn new(template_name: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            ..Default::default()
        }
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.sandbox_idle_timeout_seconds = Some(secs);
        self
    }

    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.sandbox_ttl_in_seconds = Some(secs);
        self
    }

    /// Request a caller-chosen sandbox id.
    pub fn sandbox_id(mut self, id: impl Into<String>) -> Self {
        self.sandbox_id = Some(id.into());
        self
    }

    pub fn nas(mut self, nas: NasConfig) -> Self {
        self.nas_config = Some(nas);
        self
    }

    pub fn oss(mut self, oss: OssMountConfig) -> Self {
        self.oss_mount_config = Some(oss);
        self
    }

    pub fn polar_fs(mut self, polar_fs: PolarFsConfig) -> Self {
        self.polar_fs_config = Some(polar_fs);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.template_name.trim().is_empty() {
            return Err(Error::Validation("template_name is required".into()));
        }
        if self.sandbox_idle_timeout_seconds == Some(0) {
            return Err(Error::Validation("idle timeout must be > 0".into()));
        }
        if self.sandbox_ttl_in_seconds == Some(0) {
            return Err(Error::Validation("ttl must be > 0".into()));
        }
        if self.sandbox_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(Error::Validation("sandbox_id must not be empty".into()));
        }
        Ok(())
    }
}

/// Filter and page token for listing sandboxes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListSandboxesInput {
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
    pub status: Option<SandboxStatus>,
    pub template_name: Option<String>,
    pub template_type: Option<TemplateType>,
}

impl ListSandboxesInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_results(mut self, max: u32) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn next_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    pub fn status(mut self, status: SandboxStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn template_name(mut self, name: impl Into<String>) -> Self {
        self.template_name = Some(name.into());
        self
    }

    pub fn template_type(mut self, template_type: TemplateType) -> Self {
        self.template_type = Some(template_type);
        self
    }
}

/// One page of sandbox descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxPage {
    pub sandboxes: Vec<SandboxInfo>,
    pub next_token: Option<String>,
}

/// Readiness as reported by the sandbox health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Ok,
    NotReady,
    Other(String),
}

impl HealthState {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "ok" | "healthy" | "ready" => Self::Ok,
            "not_ready" | "notready" | "starting" | "unhealthy" => Self::NotReady,
            _ => Self::Other(raw.to_string()),
        }
    }
}

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn is_ready(&self) -> bool {
        self.status == HealthState::Ok
    }

    pub(crate) fn not_ready(message: impl Into<String>) -> Self {
        Self {
            status: HealthState::NotReady,
            code: None,
            message: Some(message.into()),
        }
    }
}
