//! Lifecycle manager for templates and sandboxes.

use crate::api::{self, check_status, control, Api};
use crate::config::Config;
use crate::error::{Error, ResourceKind, Result};
use crate::guard;
use crate::model::{
    HealthState, HealthStatus, ListSandboxesInput, PageableInput, SandboxInfo, SandboxInput,
    SandboxPage, SandboxStatus, Template, TemplateInput, TemplateType, TemplateUpdate,
};
use crate::pagination::{TemplateList, TemplatePages};
use crate::sandbox::Sandbox;
use crate::transport::{Endpoint, HttpTransport, Transport};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Entry point for template and sandbox management.
///
/// A `Client` is cheap to clone; clones share the transport and the
/// configuration resolved at construction.
#[derive(Clone)]
pub struct Client {
    api: Api,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", self.config())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client backed by the HTTP transport.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let transport = HttpTransport::new(config.clone())?;
        Ok(Self {
            api: Api::new(Arc::new(transport), config),
        })
    }

    /// Create a client from environment variables. See [`Config::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    /// Create a client over a custom transport.
    pub fn with_transport(config: Config, transport: impl Transport + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api: Api::new(Arc::new(transport), Arc::new(config)),
        })
    }

    pub fn config(&self) -> &Config {
        self.api.config()
    }

    pub(crate) fn api(&self) -> &Api {
        &self.api
    }

    // Templates

    /// Create a template. Unset resources are filled with the type's
    /// defaults; invalid input fails before anything is sent.
    pub async fn create_template(&self, input: TemplateInput) -> Result<Template> {
        let name = input.template_name.clone();
        let template_type = input.template_type;
        let request = control::create_template(input)?;
        tracing::info!(template_name = %name, template_type = %template_type, "Creating template");
        let template: Template = self.api.call(request).await?;
        tracing::info!(template_name = %name, status = ?template.status, "Template created");
        Ok(template)
    }

    pub async fn get_template(&self, name: &str) -> Result<Template> {
        self.api.call(control::get_template(name)?).await
    }

    /// Update a template. The template type cannot be changed.
    pub async fn update_template(&self, name: &str, update: TemplateUpdate) -> Result<Template> {
        let request = control::update_template(name, &update)?;
        tracing::info!(template_name = %name, "Updating template");
        self.api.call(request).await
    }

    pub async fn delete_template(&self, name: &str) -> Result<()> {
        let request = control::delete_template(name)?;
        tracing::info!(template_name = %name, "Deleting template");
        self.api.execute(request).await
    }

    /// List templates lazily, one page per fetch.
    pub fn list_templates(&self, page: PageableInput) -> TemplatePages {
        TemplatePages::new(self.clone(), page)
    }

    pub(crate) async fn fetch_template_page(&self, page: &PageableInput) -> Result<TemplateList> {
        let list: Option<TemplateList> = self.api.call(control::list_templates(page)?).await?;
        Ok(list.unwrap_or_default())
    }

    // Sandboxes

    /// Create a sandbox from a template.
    ///
    /// Returns as soon as the server accepts the request; the sandbox may
    /// still be `Creating`. Poll [`check_health`](Self::check_health) to
    /// wait for readiness.
    pub async fn create(&self, template_type: TemplateType, input: SandboxInput) -> Result<Sandbox> {
        let request = control::create_sandbox(&input)?;
        let start = Instant::now();
        tracing::info!(
            template_name = %input.template_name,
            template_type = %template_type,
            "Creating sandbox"
        );

        let info: SandboxInfo = self.api.call(request).await?;
        let template_type = match info.template_type {
            Some(reported) if reported != template_type => {
                tracing::warn!(
                    sandbox_id = %info.sandbox_id,
                    requested = %template_type,
                    reported = %reported,
                    "Server reported a different template type"
                );
                reported
            }
            _ => template_type,
        };
        tracing::info!(
            sandbox_id = %info.sandbox_id,
            status = %info.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sandbox created"
        );
        Ok(Sandbox::new(self.clone(), info, template_type))
    }

    /// Attach to an existing sandbox by id.
    ///
    /// The sandbox is always read first; an unknown id fails with
    /// [`Error::NotFound`] and nothing else is sent. When `template_type`
    /// is `None` and the sandbox descriptor does not carry one, the
    /// originating template is looked up.
    pub async fn connect(&self, id: &str, template_type: Option<TemplateType>) -> Result<Sandbox> {
        let info = self.get_sandbox(id).await?;
        if matches!(info.status, SandboxStatus::Deleting | SandboxStatus::Deleted) {
            return Err(Error::NotFound {
                kind: ResourceKind::Sandbox,
                id: id.to_string(),
            });
        }

        let template_type = match template_type.or(info.template_type) {
            Some(t) => t,
            None => {
                let name = info.template_name.as_deref().ok_or_else(|| {
                    Error::invalid_state("sandbox with a known template", "no template name")
                })?;
                tracing::debug!(sandbox_id = %id, template_name = %name, "Looking up template type");
                self.get_template(name).await?.template_type.ok_or_else(|| {
                    Error::invalid_state("template with a known type", "no template type")
                })?
            }
        };
        tracing::info!(sandbox_id = %id, template_type = %template_type, status = %info.status, "Connected to sandbox");
        Ok(Sandbox::new(self.clone(), info, template_type))
    }

    /// Read the current descriptor of a sandbox.
    pub async fn get_sandbox(&self, id: &str) -> Result<SandboxInfo> {
        self.api.call(control::get_sandbox(id)?).await
    }

    /// Stop a sandbox and return its descriptor as reported afterwards.
    pub async fn stop_by_id(&self, id: &str) -> Result<SandboxInfo> {
        let request = control::stop_sandbox(id)?;
        tracing::info!(sandbox_id = %id, "Stopping sandbox");
        let info: SandboxInfo = self.api.call(request).await?;
        tracing::info!(sandbox_id = %id, status = %info.status, "Sandbox stop requested");
        Ok(info)
    }

    /// Delete a sandbox and return its descriptor as reported afterwards.
    pub async fn delete_by_id(&self, id: &str) -> Result<SandboxInfo> {
        let request = control::delete_sandbox(id)?;
        tracing::info!(sandbox_id = %id, "Deleting sandbox");
        let info: SandboxInfo = self.api.call(request).await?;
        tracing::info!(sandbox_id = %id, status = %info.status, "Sandbox delete requested");
        Ok(info)
    }

    /// Probe sandbox readiness once.
    ///
    /// A sandbox that is still starting is reported as
    /// [`HealthState::NotReady`], never as an error.
    pub async fn check_health(&self, sandbox: &Sandbox) -> Result<HealthStatus> {
        let timeout = self.config().timeout;
        let response = sandbox.data().send(api::data::health()).await?;
        if matches!(response.status, 502..=504) {
            tracing::debug!(sandbox_id = %sandbox.id(), status = response.status, "Sandbox not ready");
            return Ok(HealthStatus::not_ready(format!("HTTP {}", response.status)));
        }
        let resource = (ResourceKind::Sandbox, sandbox.id().to_string());
        check_status(&response, Some(&resource), timeout)?;

        #[derive(Deserialize)]
        struct RawHealth {
            status: Option<String>,
            code: Option<String>,
            message: Option<String>,
        }
        let raw: Option<RawHealth> = api::decode(Endpoint::Data, &response)?;
        let health = match raw {
            Some(raw) => HealthStatus {
                status: raw
                    .status
                    .as_deref()
                    .map(HealthState::parse)
                    .unwrap_or(HealthState::Ok),
                code: raw.code,
                message: raw.message,
            },
            None => HealthStatus {
                status: HealthState::Ok,
                code: None,
                message: None,
            },
        };
        tracing::debug!(sandbox_id = %sandbox.id(), status = ?health.status, "Health checked");
        Ok(health)
    }

    /// List one page of sandboxes.
    pub async fn list(&self, input: ListSandboxesInput) -> Result<SandboxPage> {
        let page: Option<SandboxPage> = self.api.call(control::list_sandboxes(&input)?).await?;
        Ok(page.unwrap_or_default())
    }

    /// Create a sandbox, run `body` with it and delete it afterwards.
    ///
    /// The delete is issued exactly once whether `body` succeeds, fails or
    /// is cancelled. An error from `body` takes precedence over a failed
    /// delete, which is then only logged.
    pub async fn with_sandbox<T, E, F, Fut>(
        &self,
        template_type: TemplateType,
        input: SandboxInput,
        body: F,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(Sandbox) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let sandbox = self.create(template_type, input).await?;
        guard::scoped(sandbox, body).await
    }
}
