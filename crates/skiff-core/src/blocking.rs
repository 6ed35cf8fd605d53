//! Blocking API.
//!
//! Every type here wraps its async counterpart and runs each call to
//! completion on a current-thread runtime owned by the [`Client`]. There is
//! no second implementation: validation, requests, decoding and errors are
//! exactly those of the async API.
//!
//! Blocking calls must not be made from inside an async runtime; they fail
//! with [`Error::InvalidState`] instead of blocking the executor.
//!
//! ```ignore
//! use skiff_core::blocking::Client;
//! use skiff_core::{Config, SandboxInput, TemplateType, CodeLanguage};
//!
//! let client = Client::new(Config::from_env())?;
//! client.with_sandbox(TemplateType::CodeInterpreter, SandboxInput::new("my-template"), |sandbox| {
//!     sandbox.with_context(CodeLanguage::Python, |ctx| {
//!         ctx.execute("x = 10", None)?;
//!         let out = ctx.execute("print(x)", None)?;
//!         println!("{}", out.stdout());
//!         Ok::<_, skiff_core::Error>(())
//!     })
//! })?;
//! # Ok::<_, skiff_core::Error>(())
//! ```

use crate::capability::CapabilitySet;
use crate::config::Config;
use crate::error::{Error, ResourceKind, Result};
use crate::facade::{ExecuteOptions, WriteOptions};
use crate::guard::settle;
use crate::model::{
    CodeLanguage, CommandResult, ContextInfo, DownloadResult, ExecutionResult, FileContent,
    FileEntry, FileStat, HealthStatus, ListSandboxesInput, PageableInput, ProcessInfo,
    RecordingInfo, SandboxId, SandboxInfo, SandboxInput, SandboxPage, SandboxStatus, Template,
    TemplateInput, TemplateType, TemplateUpdate, UploadResult,
};
use crate::transport::Transport;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

/// Runs async operations to completion on the caller's thread.
#[derive(Debug, Clone)]
pub(crate) struct Bridge {
    runtime: Arc<Runtime>,
}

impl Bridge {
    fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    pub(crate) fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        if Handle::try_current().is_ok() {
            return Err(Error::invalid_state(
                "blocking call outside an async runtime",
                "inside an async runtime",
            ));
        }
        self.runtime.block_on(fut)
    }
}

/// Generate blocking wrappers that forward to `self.inner` through the
/// bridge. `-> @wrap T` converts the async result into the blocking `T`.
macro_rules! blocking_methods {
    ($(
        $(#[$meta:meta])*
        fn $name:ident(&self $(, $arg:ident: $ty:ty)* $(,)?) -> $(@$wrap:ident)? $ret:ty;
    )*) => {
        $(
            $(#[$meta])*
            pub fn $name(&self $(, $arg: $ty)*) -> Result<$ret> {
                let result = self.bridge.run(self.inner.$name($($arg),*));
                $( let result = result.map(|inner| <$ret>::$wrap(&self.bridge, inner)); )?
                result
            }
        )*
    };
}

/// A resource released by a blocking guard.
pub trait Release: Clone {
    fn resource(&self) -> (ResourceKind, String);
    fn release(&self) -> Result<()>;
}

/// Blocking counterpart of [`crate::Guard`]: releases on drop, including
/// while unwinding from a panic.
pub struct Guard<R: Release> {
    resource: Option<R>,
}

impl<R: Release> Guard<R> {
    pub fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn release(mut self) -> Result<()> {
        match self.resource.take() {
            Some(resource) => release_once(&resource),
            None => Ok(()),
        }
    }

    pub fn disarm(mut self) -> Option<R> {
        self.resource.take()
    }
}

impl<R: Release> Drop for Guard<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if let Err(e) = release_once(&resource) {
                let (kind, id) = resource.resource();
                tracing::warn!(kind = %kind, id = %id, error = %e, "Release on drop failed");
            }
        }
    }
}

fn release_once<R: Release>(resource: &R) -> Result<()> {
    match resource.release() {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

fn scoped<R, T, E, F>(resource: R, body: F) -> std::result::Result<T, E>
where
    R: Release,
    E: From<Error>,
    F: FnOnce(R) -> std::result::Result<T, E>,
{
    let guard = Guard::new(resource.clone());
    let outcome = body(resource.clone());
    let cleanup = guard.release();
    settle(resource.resource(), outcome, cleanup)
}

/// Blocking lifecycle client.
#[derive(Debug, Clone)]
pub struct Client {
    inner: crate::Client,
    bridge: Bridge,
}

impl Client {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            inner: crate::Client::new(config)?,
            bridge: Bridge::new()?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    pub fn with_transport(config: Config, transport: impl Transport + 'static) -> Result<Self> {
        Ok(Self {
            inner: crate::Client::with_transport(config, transport)?,
            bridge: Bridge::new()?,
        })
    }

    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    /// The async client sharing this client's transport.
    pub fn as_async(&self) -> &crate::Client {
        &self.inner
    }

    blocking_methods! {
        fn create_template(&self, input: TemplateInput) -> Template;
        fn get_template(&self, name: &str) -> Template;
        fn update_template(&self, name: &str, update: TemplateUpdate) -> Template;
        fn delete_template(&self, name: &str) -> ();
        fn create(&self, template_type: TemplateType, input: SandboxInput) -> @wrap Sandbox;
        fn connect(&self, id: &str, template_type: Option<TemplateType>) -> @wrap Sandbox;
        fn get_sandbox(&self, id: &str) -> SandboxInfo;
        fn stop_by_id(&self, id: &str) -> SandboxInfo;
        fn delete_by_id(&self, id: &str) -> SandboxInfo;
        fn list(&self, input: ListSandboxesInput) -> SandboxPage;
    }

    pub fn check_health(&self, sandbox: &Sandbox) -> Result<HealthStatus> {
        self.bridge.run(self.inner.check_health(&sandbox.inner))
    }

    pub fn list_templates(&self, page: PageableInput) -> TemplatePages {
        TemplatePages {
            inner: self.inner.list_templates(page),
            bridge: self.bridge.clone(),
            stalled: false,
        }
    }

    /// Create a sandbox, run `body` with it and delete it afterwards.
    pub fn with_sandbox<T, E, F>(
        &self,
        template_type: TemplateType,
        input: SandboxInput,
        body: F,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(Sandbox) -> std::result::Result<T, E>,
    {
        let sandbox = self.create(template_type, input)?;
        scoped(sandbox, body)
    }
}

/// Template pages as an iterator.
///
/// The iterator ends after yielding an `Err`. The position is kept, so
/// [`resume`](Self::resume) retries the failed page.
pub struct TemplatePages {
    inner: crate::TemplatePages,
    bridge: Bridge,
    stalled: bool,
}

impl TemplatePages {
    pub fn restart(&mut self) {
        self.inner.restart();
        self.stalled = false;
    }

    /// Continue after a failed fetch, starting with the page that failed.
    pub fn resume(&mut self) {
        self.stalled = false;
    }

    pub fn collect_all(self) -> Result<Vec<Template>> {
        self.bridge.run(self.inner.collect_all())
    }
}

impl Iterator for TemplatePages {
    type Item = Result<Vec<Template>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stalled {
            return None;
        }
        let item = self.bridge.run(self.inner.next_page()).transpose();
        self.stalled = matches!(item, Some(Err(_)));
        item
    }
}

/// Blocking sandbox handle.
#[derive(Debug, Clone)]
pub struct Sandbox {
    inner: crate::Sandbox,
    bridge: Bridge,
}

impl Sandbox {
    fn wrap(bridge: &Bridge, inner: crate::Sandbox) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    pub fn id(&self) -> &SandboxId {
        self.inner.id()
    }

    pub fn info(&self) -> &SandboxInfo {
        self.inner.info()
    }

    pub fn template_type(&self) -> TemplateType {
        self.inner.template_type()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    pub fn status(&self) -> SandboxStatus {
        self.inner.status()
    }

    pub fn as_async(&self) -> &crate::Sandbox {
        &self.inner
    }

    blocking_methods! {
        fn stop(&self) -> SandboxInfo;
        fn delete(&self) -> SandboxInfo;
        fn refresh(&self) -> SandboxInfo;
        fn check_health(&self) -> HealthStatus;
    }

    pub fn contexts(&self) -> Result<Contexts> {
        Ok(Contexts::wrap(&self.bridge, self.inner.contexts()?))
    }

    pub fn files(&self) -> Result<Files> {
        Ok(Files::wrap(&self.bridge, self.inner.files()?))
    }

    pub fn file_system(&self) -> Result<FileSystem> {
        Ok(FileSystem::wrap(&self.bridge, self.inner.file_system()?))
    }

    pub fn processes(&self) -> Result<Processes> {
        Ok(Processes::wrap(&self.bridge, self.inner.processes()?))
    }

    pub fn browser(&self) -> Result<Browser> {
        Ok(Browser::wrap(&self.bridge, self.inner.browser()?))
    }

    pub fn recordings(&self) -> Result<Recordings> {
        Ok(Recordings::wrap(&self.bridge, self.inner.recordings()?))
    }

    /// Create a context, run `body` with it and delete it afterwards.
    pub fn with_context<T, E, F>(&self, language: CodeLanguage, body: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(Context) -> std::result::Result<T, E>,
    {
        let context = self.contexts()?.create(language, None)?;
        scoped(context, body)
    }
}

impl Release for Sandbox {
    fn resource(&self) -> (ResourceKind, String) {
        (ResourceKind::Sandbox, self.inner.id().to_string())
    }

    fn release(&self) -> Result<()> {
        self.delete().map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct Contexts {
    inner: crate::Contexts,
    bridge: Bridge,
}

impl Contexts {
    fn wrap(bridge: &Bridge, inner: crate::Contexts) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    blocking_methods! {
        fn create(&self, language: CodeLanguage, cwd: Option<&str>) -> @wrap Context;
        fn list(&self) -> Vec<ContextInfo>;
        fn get(&self, context_id: &str) -> @wrap Context;
        fn delete(&self, context_id: &str) -> ();
        fn execute(&self, code: &str, options: ExecuteOptions) -> ExecutionResult;
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    inner: crate::Context,
    bridge: Bridge,
}

impl Context {
    fn wrap(bridge: &Bridge, inner: crate::Context) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn info(&self) -> &ContextInfo {
        self.inner.info()
    }

    pub fn language(&self) -> CodeLanguage {
        self.inner.language()
    }

    blocking_methods! {
        fn execute(&self, code: &str, timeout: Option<Duration>) -> ExecutionResult;
        fn delete(&self) -> ();
    }
}

impl Release for Context {
    fn resource(&self) -> (ResourceKind, String) {
        (ResourceKind::Context, self.inner.id().to_string())
    }

    fn release(&self) -> Result<()> {
        self.bridge
            .run(<crate::Context as crate::Releasable>::release(&self.inner))
    }
}

#[derive(Debug, Clone)]
pub struct Files {
    inner: crate::Files,
    bridge: Bridge,
}

impl Files {
    fn wrap(bridge: &Bridge, inner: crate::Files) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    blocking_methods! {
        fn read(&self, path: &str) -> FileContent;
        fn write(&self, path: &str, content: &str, options: WriteOptions) -> ();
    }
}

#[derive(Debug, Clone)]
pub struct FileSystem {
    inner: crate::FileSystem,
    bridge: Bridge,
}

impl FileSystem {
    fn wrap(bridge: &Bridge, inner: crate::FileSystem) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    blocking_methods! {
        fn list(&self, path: Option<&str>, depth: Option<u32>) -> Vec<FileEntry>;
        fn stat(&self, path: &str) -> FileStat;
        fn mkdir(&self, path: &str, parents: bool, mode: Option<&str>) -> ();
        fn move_path(&self, source: &str, destination: &str) -> ();
        fn remove(&self, path: &str) -> ();
        fn upload(&self, local_path: &Path, remote_path: &str) -> UploadResult;
        fn download(&self, remote_path: &str, local_path: &Path) -> DownloadResult;
    }
}

#[derive(Debug, Clone)]
pub struct Processes {
    inner: crate::Processes,
    bridge: Bridge,
}

impl Processes {
    fn wrap(bridge: &Bridge, inner: crate::Processes) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    blocking_methods! {
        fn cmd(&self, command: &str, cwd: Option<&str>, timeout: Option<Duration>) -> CommandResult;
        fn list(&self) -> Vec<ProcessInfo>;
        fn get(&self, pid: &str) -> ProcessInfo;
        fn kill(&self, pid: &str) -> ();
    }
}

#[derive(Debug, Clone)]
pub struct Browser {
    inner: crate::Browser,
    bridge: Bridge,
}

impl Browser {
    fn wrap(bridge: &Bridge, inner: crate::Browser) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    pub fn cdp_url(&self, record: bool) -> Result<String> {
        self.inner.cdp_url(record)
    }

    pub fn vnc_url(&self, record: bool) -> Result<String> {
        self.inner.vnc_url(record)
    }

    blocking_methods! {
        fn access_headers(&self) -> Vec<(String, String)>;
        fn connect(&self, record: bool) -> @wrap BrowserSession;
    }

    /// Open a session, run `body` with it and close it afterwards.
    pub fn with_session<T, E, F>(&self, record: bool, body: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(BrowserSession) -> std::result::Result<T, E>,
    {
        let session = self.connect(record)?;
        scoped(session, body)
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSession {
    inner: crate::BrowserSession,
    bridge: Bridge,
}

impl BrowserSession {
    fn wrap(bridge: &Bridge, inner: crate::BrowserSession) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    pub fn target_id(&self) -> &str {
        self.inner.target_id()
    }

    blocking_methods! {
        fn navigate(&self, url: &str) -> ();
        fn evaluate(&self, expression: &str) -> Value;
        fn content(&self) -> String;
        fn title(&self) -> String;
        fn click(&self, selector: &str) -> ();
        fn fill(&self, selector: &str, value: &str) -> ();
        fn screenshot(&self) -> Vec<u8>;
        fn close(&self) -> ();
    }
}

impl Release for BrowserSession {
    fn resource(&self) -> (ResourceKind, String) {
        (ResourceKind::BrowserSession, self.inner.target_id().to_string())
    }

    fn release(&self) -> Result<()> {
        self.close()
    }
}

#[derive(Debug, Clone)]
pub struct Recordings {
    inner: crate::Recordings,
    bridge: Bridge,
}

impl Recordings {
    fn wrap(bridge: &Bridge, inner: crate::Recordings) -> Self {
        Self {
            inner,
            bridge: bridge.clone(),
        }
    }

    blocking_methods! {
        fn list(&self) -> Vec<RecordingInfo>;
        fn download(&self, filename: &str, save_path: &Path) -> DownloadResult;
        fn delete(&self, filename: &str) -> ();
    }
}
