//! Browser access: CDP and live-view URLs, automation sessions.

use crate::cdp::BrowserSession;
use crate::error::{Error, Result};
use crate::guard;
use crate::sandbox::Sandbox;
use crate::transport::DATA_TOKEN_HEADER;
use std::future::Future;

const AUTOMATION_PATH: &str = "/ws/automation";
const LIVE_VIEW_PATH: &str = "/ws/liveview";

#[derive(Debug, Clone)]
pub struct Browser {
    sandbox: Sandbox,
}

impl Browser {
    pub(crate) fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// WebSocket URL of the browser's DevTools endpoint.
    ///
    /// The URL only identifies the sandbox; access is granted by the
    /// data-plane token, which is scoped in time. With `record` set the
    /// session started through it is recorded.
    pub fn cdp_url(&self, record: bool) -> Result<String> {
        self.sandbox.live_data()?.ws_url(AUTOMATION_PATH, record)
    }

    /// WebSocket URL of the live desktop view.
    pub fn vnc_url(&self, record: bool) -> Result<String> {
        self.sandbox.live_data()?.ws_url(LIVE_VIEW_PATH, record)
    }

    /// Headers an external CDP or VNC client must send with the URLs above.
    pub async fn access_headers(&self) -> Result<Vec<(String, String)>> {
        let token = self.sandbox.live_data()?.token().await?;
        Ok(vec![(DATA_TOKEN_HEADER.to_string(), token)])
    }

    /// Open an automation session on a new page.
    pub async fn connect(&self, record: bool) -> Result<BrowserSession> {
        let url = self.cdp_url(record)?;
        let headers = self.access_headers().await?;
        let timeout = self.sandbox.live_data()?.timeout();
        BrowserSession::connect(self.sandbox.id().clone(), &url, &headers, timeout).await
    }

    /// Open a session, run `body` with it and close it afterwards.
    ///
    /// With `record` set, the recording is kept on the sandbox after the
    /// session closes; see [`Recordings`](crate::Recordings).
    pub async fn with_session<T, E, F, Fut>(&self, record: bool, body: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(BrowserSession) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let session = self.connect(record).await?;
        guard::scoped(session, body).await
    }
}
