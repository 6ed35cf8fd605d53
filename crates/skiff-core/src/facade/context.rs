//! Code execution contexts.

use crate::api::data;
use crate::error::{ResourceKind, Result};
use crate::guard::Releasable;
use crate::model::{CodeLanguage, ContextInfo, ExecutionResult};
use crate::sandbox::Sandbox;
use async_trait::async_trait;
use std::time::Duration;

/// Working directory of new contexts when none is given.
pub const DEFAULT_CONTEXT_CWD: &str = "/home/user";

/// Options for [`Contexts::execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Run inside this context, keeping state between runs. Without one the
    /// run is stateless.
    pub context_id: Option<String>,
    pub language: Option<CodeLanguage>,
    /// Server-side limit; the client waits 10s longer before giving up.
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn language(mut self, language: CodeLanguage) -> Self {
        self.language = Some(language);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Context and code execution operations.
///
/// Executions against one context are not serialized by the client; issue
/// them one after another when ordering matters.
#[derive(Debug, Clone)]
pub struct Contexts {
    sandbox: Sandbox,
}

impl Contexts {
    pub(crate) fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// Create a context. `cwd` defaults to [`DEFAULT_CONTEXT_CWD`].
    pub async fn create(&self, language: CodeLanguage, cwd: Option<&str>) -> Result<Context> {
        let request = data::create_context(language, cwd.unwrap_or(DEFAULT_CONTEXT_CWD))?;
        let info: ContextInfo = self.sandbox.live_data()?.call(request).await?;
        tracing::info!(sandbox_id = %self.sandbox.id(), context_id = %info.id, language = %info.language, "Context created");
        Ok(Context::new(self.sandbox.clone(), info))
    }

    pub async fn list(&self) -> Result<Vec<ContextInfo>> {
        self.sandbox
            .live_data()?
            .call_list(data::list_contexts())
            .await
    }

    pub async fn get(&self, context_id: &str) -> Result<Context> {
        let request = data::get_context(context_id)?;
        let info: ContextInfo = self.sandbox.live_data()?.call(request).await?;
        Ok(Context::new(self.sandbox.clone(), info))
    }

    pub async fn delete(&self, context_id: &str) -> Result<()> {
        let request = data::delete_context(context_id)?;
        self.sandbox.live_data()?.execute(request).await?;
        tracing::info!(sandbox_id = %self.sandbox.id(), context_id = %context_id, "Context deleted");
        Ok(())
    }

    /// Run code, statelessly or inside a context.
    ///
    /// A raised exception is reported in [`ExecutionResult::error`]; use
    /// [`ExecutionResult::into_result`] to turn it into an error.
    pub async fn execute(&self, code: &str, options: ExecuteOptions) -> Result<ExecutionResult> {
        let request = data::execute(
            code,
            options.context_id.as_deref(),
            options.language,
            options.timeout,
        )?;
        tracing::debug!(
            sandbox_id = %self.sandbox.id(),
            context_id = ?options.context_id,
            code_len = code.len(),
            "Executing code"
        );
        let result: ExecutionResult = self.sandbox.live_data()?.call(request).await?;
        tracing::debug!(
            sandbox_id = %self.sandbox.id(),
            outputs = result.outputs.len(),
            failed = result.error.is_some(),
            "Code execution completed"
        );
        Ok(result)
    }
}

/// A server-side execution context.
#[derive(Clone)]
pub struct Context {
    sandbox: Sandbox,
    info: ContextInfo,
}

impl Context {
    fn new(sandbox: Sandbox, info: ContextInfo) -> Self {
        Self { sandbox, info }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &ContextInfo {
        &self.info
    }

    pub fn language(&self) -> CodeLanguage {
        self.info.language
    }

    /// Run code in this context.
    pub async fn execute(&self, code: &str, timeout: Option<Duration>) -> Result<ExecutionResult> {
        let options = ExecuteOptions {
            context_id: Some(self.info.id.clone()),
            language: None,
            timeout,
        };
        Contexts::new(self.sandbox.clone())
            .execute(code, options)
            .await
    }

    pub async fn delete(&self) -> Result<()> {
        Contexts::new(self.sandbox.clone())
            .delete(&self.info.id)
            .await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("sandbox_id", self.sandbox.id())
            .field("info", &self.info)
            .finish()
    }
}

#[async_trait]
impl Releasable for Context {
    fn resource(&self) -> (ResourceKind, String) {
        (ResourceKind::Context, self.info.id.clone())
    }

    async fn release(&self) -> Result<()> {
        // Contexts go away with their sandbox.
        if !self.sandbox.status().is_live() {
            return Ok(());
        }
        self.delete().await
    }
}
