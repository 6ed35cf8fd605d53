//! Template descriptors, creation input and validation.

use crate::capability::CapabilitySet;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default idle timeout applied to new templates, in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// Default maximum sandbox lifetime applied to new templates, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 21600;

/// Default per-sandbox concurrency limit.
pub const DEFAULT_CONCURRENCY_LIMIT: u32 = 200;

/// Disk size required by browser-capable templates, in MB.
pub const BROWSER_DISK_SIZE_MB: u32 = 10240;

/// Kind of sandbox a template produces. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateType {
    #[serde(rename = "CodeInterpreter")]
    CodeInterpreter,
    #[serde(rename = "Browser")]
    Browser,
    #[serde(rename = "AllInOne")]
    Aio,
}

impl TemplateType {
    /// Wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeInterpreter => "CodeInterpreter",
            Self::Browser => "Browser",
            Self::Aio => "AllInOne",
        }
    }

    /// Capabilities attached to sandboxes of this type.
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::for_template(*self)
    }

    /// Resource floor used for fields left unset at creation.
    pub fn default_resources(&self) -> Resources {
        match self {
            Self::CodeInterpreter => Resources {
                cpu: 2.0,
                memory: 4096,
                disk_size: 512,
            },
            Self::Browser => Resources {
                cpu: 2.0,
                memory: 4096,
                disk_size: BROWSER_DISK_SIZE_MB,
            },
            Self::Aio => Resources {
                cpu: 4.0,
                memory: 8192,
                disk_size: BROWSER_DISK_SIZE_MB,
            },
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "codeinterpreter" | "code" => Ok(Self::CodeInterpreter),
            "browser" => Ok(Self::Browser),
            "allinone" | "aio" => Ok(Self::Aio),
            _ => Err(Error::Validation(format!("unknown template type: {s}"))),
        }
    }
}

/// CPU, memory and disk allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resources {
    /// CPU cores.
    pub cpu: f64,
    /// Memory in MB.
    pub memory: u32,
    /// Disk in MB.
    pub disk_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkMode {
    #[default]
    Public,
    Private,
    PublicAndPrivate,
}

impl NetworkMode {
    /// Whether this mode attaches the sandbox to a VPC.
    pub fn needs_vpc(&self) -> bool {
        matches!(self, Self::Private | Self::PublicAndPrivate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    #[serde(default)]
    pub network_mode: NetworkMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vswitch_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group_id: Option<String>,
}

impl NetworkConfiguration {
    /// Private networking inside the given VPC.
    pub fn private(vpc_id: impl Into<String>) -> Self {
        Self {
            network_mode: NetworkMode::Private,
            vpc_id: Some(vpc_id.into()),
            ..Default::default()
        }
    }
}

/// Log shipping destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logstore: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OssPermission {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// Object-storage bucket mounted into every sandbox of the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssConfiguration {
    pub bucket_name: String,
    pub prefix: String,
    pub mount_point: String,
    pub region: String,
    #[serde(default)]
    pub permission: OssPermission,
}

/// Custom container image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
}

/// Input for creating a template.
///
/// Unset resource fields are filled from [`TemplateType::default_resources`]
/// by [`TemplateInput::with_defaults`] before submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInput {
    pub template_name: String,
    pub template_type: TemplateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_idle_timeout_in_seconds: Option<u64>,
    #[serde(rename = "sandboxTTLInSeconds", skip_serializing_if = "Option::is_none")]
    pub sandbox_ttl_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_concurrency_limit_per_sandbox: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_configuration: Option<NetworkConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<LogConfiguration>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub oss_configuration: Vec<OssConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_configuration: Option<ContainerConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_configuration: Option<CredentialConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
}

impl TemplateInput {
    /// Start an input for a template of the given type.
    pub fn new(template_name: impl Into<String>, template_type: TemplateType) -> Self {
        Self {
            template_name: template_name.into(),
            template_type,
            cpu: None,
            memory: None,
            disk_size: None,
            sandbox_idle_timeout_in_seconds: None,
            sandbox_ttl_in_seconds: None,
            share_concurrency_limit_per_sandbox: None,
            description: None,
            environment_variables: BTreeMap::new(),
            network_configuration: None,
            log_configuration: None,
            oss_configuration: Vec::new(),
            container_configuration: None,
            credential_configuration: None,
            execution_role_arn: None,
        }
    }

    pub fn cpu(mut self, cpu: f64) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Memory in MB.
    pub fn memory(mut self, memory: u32) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Disk in MB.
    pub fn disk_size(mut self, disk_size: u32) -> Self {
        self.disk_size = Some(disk_size);
        self
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.sandbox_idle_timeout_in_seconds = Some(secs);
        self
    }

    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.sandbox_ttl_in_seconds = Some(secs);
        self
    }

    pub fn concurrency_limit(mut self, limit: u32) -> Self {
        self.share_concurrency_limit_per_sandbox = Some(limit);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    pub fn network(mut self, network: NetworkConfiguration) -> Self {
        self.network_configuration = Some(network);
        self
    }

    pub fn log(mut self, log: LogConfiguration) -> Self {
        self.log_configuration = Some(log);
        self
    }

    pub fn oss_mount(mut self, oss: OssConfiguration) -> Self {
        self.oss_configuration.push(oss);
        self
    }

    pub fn container(mut self, container: ContainerConfiguration) -> Self {
        self.container_configuration = Some(container);
        self
    }

    pub fn credential(mut self, credential_name: impl Into<String>) -> Self {
        self.credential_configuration = Some(CredentialConfiguration {
            credential_name: Some(credential_name.into()),
        });
        self
    }

    pub fn execution_role_arn(mut self, arn: impl Into<String>) -> Self {
        self.execution_role_arn = Some(arn.into());
        self
    }

    /// Fill every unset field with its type-specific default.
    ///
    /// Fields the caller set explicitly are never overwritten.
    pub fn with_defaults(mut self) -> Self {
        let floor = self.template_type.default_resources();
        self.cpu.get_or_insert(floor.cpu);
        self.memory.get_or_insert(floor.memory);
        self.disk_size.get_or_insert(floor.disk_size);
        self.sandbox_idle_timeout_in_seconds
            .get_or_insert(DEFAULT_IDLE_TIMEOUT_SECS);
        self.sandbox_ttl_in_seconds.get_or_insert(DEFAULT_TTL_SECS);
        self.share_concurrency_limit_per_sandbox
            .get_or_insert(DEFAULT_CONCURRENCY_LIMIT);
        self.network_configuration
            .get_or_insert_with(NetworkConfiguration::default);
        self
    }

    /// Check the input for errors that can be detected locally.
    pub fn validate(&self) -> Result<()> {
        if self.template_name.trim().is_empty() {
            return Err(Error::Validation("template_name is required".into()));
        }
        validate_resources(self.cpu, self.memory)?;
        if matches!(self.template_type, TemplateType::Browser | TemplateType::Aio) {
            if let Some(disk) = self.disk_size {
                if disk != BROWSER_DISK_SIZE_MB {
                    return Err(Error::Validation(format!(
                        "{} templates require disk_size {}, got {}",
                        self.template_type, BROWSER_DISK_SIZE_MB, disk
                    )));
                }
            }
        }
        validate_common(
            &self.environment_variables,
            self.network_configuration.as_ref(),
        )
    }
}

/// Mutable subset of a template. The type cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_idle_timeout_in_seconds: Option<u64>,
    #[serde(rename = "sandboxTTLInSeconds", skip_serializing_if = "Option::is_none")]
    pub sandbox_ttl_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_concurrency_limit_per_sandbox: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_configuration: Option<NetworkConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<LogConfiguration>,
}

impl TemplateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cpu(mut self, cpu: f64) -> Self {
        self.cpu = Some(cpu);
        self
    }

    pub fn memory(mut self, memory: u32) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.sandbox_idle_timeout_in_seconds = Some(secs);
        self
    }

    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.sandbox_ttl_in_seconds = Some(secs);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    pub fn network(mut self, network: NetworkConfiguration) -> Self {
        self.network_configuration = Some(network);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_resources(self.cpu, self.memory)?;
        validate_common(
            &self.environment_variables,
            self.network_configuration.as_ref(),
        )
    }
}

fn validate_resources(cpu: Option<f64>, memory: Option<u32>) -> Result<()> {
    if let Some(cpu) = cpu {
        if cpu.is_nan() || cpu <= 0.0 {
            return Err(Error::Validation(format!("cpu must be > 0, got {cpu}")));
        }
    }
    if memory == Some(0) {
        return Err(Error::Validation("memory must be > 0".into()));
    }
    Ok(())
}

fn validate_common(
    env: &BTreeMap<String, String>,
    network: Option<&NetworkConfiguration>,
) -> Result<()> {
    if env.keys().any(|k| k.trim().is_empty()) {
        return Err(Error::Validation(
            "environment variable names must not be empty".into(),
        ));
    }
    if let Some(network) = network {
        let has_vpc = network.vpc_id.as_deref().is_some_and(|v| !v.is_empty());
        if network.network_mode.needs_vpc() && !has_vpc {
            return Err(Error::Validation(
                "private network mode requires a vpc_id".into(),
            ));
        }
    }
    Ok(())
}

/// Template descriptor as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Template {
    pub template_id: String,
    pub template_name: String,
    pub template_type: Option<TemplateType>,
    pub cpu: Option<f64>,
    pub memory: Option<u32>,
    pub disk_size: Option<u32>,
    pub sandbox_idle_timeout_in_seconds: Option<u64>,
    #[serde(rename = "sandboxTTLInSeconds")]
    pub sandbox_ttl_in_seconds: Option<u64>,
    pub share_concurrency_limit_per_sandbox: Option<u32>,
    pub environment_variables: BTreeMap<String, String>,
    pub network_configuration: Option<NetworkConfiguration>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub created_at: Option<String>,
    pub last_updated_at: Option<String>,
}

/// Page request for listing templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageableInput {
    /// First page to fetch, starting at 1.
    pub page_number: u32,
    pub page_size: u32,
    pub template_type: Option<TemplateType>,
}

impl Default for PageableInput {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: 10,
            template_type: None,
        }
    }
}

impl PageableInput {
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn template_type(mut self, template_type: TemplateType) -> Self {
        self.template_type = Some(template_type);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_number == 0 {
            return Err(Error::Validation("page_number starts at 1".into()));
        }
        if self.page_size == 0 {
            return Err(Error::Validation("page_size must be > 0".into()));
        }
        Ok(())
    }
}
