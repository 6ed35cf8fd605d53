//! Sandbox handle: identity, last observed status and capability facades.

use crate::api::DataApi;
use crate::capability::{Capability, CapabilitySet};
use crate::client::Client;
use crate::error::{Error, ResourceKind, Result};
use crate::facade::{Browser, Context, Contexts, FileSystem, Files, Processes, Recordings};
use crate::guard::{self, Releasable};
use crate::model::{
    CodeLanguage, HealthStatus, SandboxId, SandboxInfo, SandboxStatus, TemplateType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Handle to a remote sandbox.
///
/// A handle records the status last reported by the server; it never
/// infers transitions on its own. Call [`refresh`](Self::refresh) for a
/// fresh read. Facades are only handed out for capabilities attached by
/// the sandbox's template type, and only while the last observed status is
/// live.
///
/// Clones share the same status record. Stopping or deleting the same
/// sandbox from two places at once is not supported.
#[derive(Clone)]
pub struct Sandbox {
    inner: Arc<SandboxInner>,
}

struct SandboxInner {
    id: SandboxId,
    info: SandboxInfo,
    template_type: TemplateType,
    capabilities: CapabilitySet,
    status: Mutex<SandboxStatus>,
    client: Client,
    data: DataApi,
}

impl Sandbox {
    pub(crate) fn new(client: Client, info: SandboxInfo, template_type: TemplateType) -> Self {
        let id = SandboxId::new(info.sandbox_id.clone());
        let data = DataApi::new(client.api().clone(), id.clone());
        Self {
            inner: Arc::new(SandboxInner {
                status: Mutex::new(info.status),
                capabilities: template_type.capabilities(),
                id,
                info,
                template_type,
                client,
                data,
            }),
        }
    }

    pub fn id(&self) -> &SandboxId {
        &self.inner.id
    }

    /// Descriptor as returned when the handle was created.
    pub fn info(&self) -> &SandboxInfo {
        &self.inner.info
    }

    pub fn template_type(&self) -> TemplateType {
        self.inner.template_type
    }

    pub fn template_name(&self) -> Option<&str> {
        self.inner.info.template_name.as_deref()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities
    }

    /// Status last reported by the server.
    pub fn status(&self) -> SandboxStatus {
        match self.inner.status.lock() {
            Ok(status) => *status,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.inner.info.created_at_utc()
    }

    pub(crate) fn data(&self) -> &DataApi {
        &self.inner.data
    }

    pub(crate) fn record_status(&self, next: SandboxStatus) {
        let mut status = match self.inner.status.lock() {
            Ok(status) => status,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !status.can_transition_to(next) {
            tracing::warn!(
                sandbox_id = %self.inner.id,
                from = %*status,
                to = %next,
                "Unexpected sandbox status transition"
            );
        }
        tracing::debug!(sandbox_id = %self.inner.id, from = %*status, to = %next, "Status observed");
        *status = next;
    }

    /// Fail with [`Error::InvalidState`] unless the last observed status is
    /// live.
    pub(crate) fn ensure_live(&self) -> Result<()> {
        let status = self.status();
        if !status.is_live() {
            return Err(Error::invalid_state("live sandbox", status));
        }
        Ok(())
    }

    /// Data-plane access after the liveness check.
    pub(crate) fn live_data(&self) -> Result<&DataApi> {
        self.ensure_live()?;
        Ok(&self.inner.data)
    }

    fn facade(&self, capability: Capability) -> Result<()> {
        self.inner.capabilities.require(capability)?;
        self.ensure_live()
    }

    /// Stop this sandbox. Same as [`Client::stop_by_id`] with this id.
    pub async fn stop(&self) -> Result<SandboxInfo> {
        let info = self.inner.client.stop_by_id(self.inner.id.as_str()).await?;
        self.record_status(info.status);
        Ok(info)
    }

    /// Delete this sandbox. Same as [`Client::delete_by_id`] with this id.
    pub async fn delete(&self) -> Result<SandboxInfo> {
        let info = self.inner.client.delete_by_id(self.inner.id.as_str()).await?;
        self.record_status(info.status);
        Ok(info)
    }

    /// Read the descriptor again and record the reported status.
    pub async fn refresh(&self) -> Result<SandboxInfo> {
        let info = self.inner.client.get_sandbox(self.inner.id.as_str()).await?;
        self.record_status(info.status);
        Ok(info)
    }

    /// Probe readiness once. Same as [`Client::check_health`].
    pub async fn check_health(&self) -> Result<HealthStatus> {
        self.inner.client.check_health(self).await
    }

    // Capability facades

    pub fn contexts(&self) -> Result<Contexts> {
        self.facade(Capability::CodeInterpreter)?;
        Ok(Contexts::new(self.clone()))
    }

    pub fn files(&self) -> Result<Files> {
        self.facade(Capability::CodeInterpreter)?;
        Ok(Files::new(self.clone()))
    }

    pub fn file_system(&self) -> Result<FileSystem> {
        self.facade(Capability::CodeInterpreter)?;
        Ok(FileSystem::new(self.clone()))
    }

    pub fn processes(&self) -> Result<Processes> {
        self.facade(Capability::CodeInterpreter)?;
        Ok(Processes::new(self.clone()))
    }

    pub fn browser(&self) -> Result<Browser> {
        self.facade(Capability::Browser)?;
        Ok(Browser::new(self.clone()))
    }

    pub fn recordings(&self) -> Result<Recordings> {
        self.facade(Capability::Browser)?;
        Ok(Recordings::new(self.clone()))
    }

    /// Create a context, run `body` with it and delete it afterwards.
    pub async fn with_context<T, E, F, Fut>(
        &self,
        language: CodeLanguage,
        body: F,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let context = self.contexts()?.create(language, None).await?;
        guard::scoped(context, body).await
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.inner.id)
            .field("template_type", &self.inner.template_type)
            .field("status", &self.status())
            .finish()
    }
}

#[async_trait]
impl Releasable for Sandbox {
    fn resource(&self) -> (ResourceKind, String) {
        (ResourceKind::Sandbox, self.inner.id.to_string())
    }

    async fn release(&self) -> Result<()> {
        self.delete().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::transport::{ApiRequest, ApiResponse, Transport};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, _request: ApiRequest) -> Result<ApiResponse> {
            Err(Error::transport("unreachable"))
        }
    }

    fn sandbox(template_type: TemplateType, status: SandboxStatus) -> Sandbox {
        let config = Config::builder().access_key("id", "secret").build().unwrap();
        let client = Client::with_transport(config, Unreachable).unwrap();
        let info = SandboxInfo {
            sandbox_id: "sb-1".into(),
            status,
            ..Default::default()
        };
        Sandbox::new(client, info, template_type)
    }

    #[test]
    fn test_facades_follow_template_type() {
        let browser = sandbox(TemplateType::Browser, SandboxStatus::Running);
        assert!(browser.browser().is_ok());
        assert!(browser.recordings().is_ok());
        assert_eq!(browser.contexts().unwrap_err().kind(), ErrorKind::State);

        let ci = sandbox(TemplateType::CodeInterpreter, SandboxStatus::Running);
        assert!(ci.processes().is_ok());
        assert_eq!(ci.browser().unwrap_err().kind(), ErrorKind::State);

        let aio = sandbox(TemplateType::Aio, SandboxStatus::Creating);
        assert!(aio.files().is_ok());
        assert!(aio.browser().is_ok());
    }

    #[test]
    fn test_facades_require_live_status() {
        let sb = sandbox(TemplateType::Aio, SandboxStatus::Running);
        sb.record_status(SandboxStatus::Deleted);
        assert_eq!(sb.status(), SandboxStatus::Deleted);
        assert!(matches!(
            sb.file_system(),
            Err(Error::InvalidState { ref actual, .. }) if actual == "Deleted"
        ));
    }

    #[test]
    fn test_clones_share_status() {
        let sb = sandbox(TemplateType::CodeInterpreter, SandboxStatus::Running);
        let other = sb.clone();
        sb.record_status(SandboxStatus::Stopped);
        assert_eq!(other.status(), SandboxStatus::Stopped);
    }
}
