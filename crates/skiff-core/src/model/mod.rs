//! Entity model: templates, sandboxes and data-plane records.

mod data;
mod sandbox;
mod template;

pub use data::{
    CodeLanguage, CommandResult, ContextInfo, DownloadResult, ExecutionError, ExecutionOutput,
    ExecutionResult, FileContent, FileEntry, FileStat, ProcessInfo, RecordingInfo, UploadResult,
};
pub use sandbox::{
    HealthState, HealthStatus, ListSandboxesInput, NasConfig, NasMountPoint, OssMountConfig,
    OssMountPoint, PolarFsConfig, PolarFsMountPoint, SandboxId, SandboxInfo, SandboxInput,
    SandboxPage, SandboxStatus,
};
pub use template::{
    ContainerConfiguration, CredentialConfiguration, LogConfiguration, NetworkConfiguration,
    NetworkMode, OssConfiguration, OssPermission, PageableInput, Resources, Template,
    TemplateInput, TemplateType, TemplateUpdate, BROWSER_DISK_SIZE_MB, DEFAULT_CONCURRENCY_LIMIT,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_TTL_SECS,
};
