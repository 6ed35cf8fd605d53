//! Browser automation over the Chrome DevTools Protocol.
//!
//! A [`BrowserSession`] opens one page target on the sandbox browser and
//! attaches to it in flattened mode, so every page command carries the
//! session id on a single WebSocket.

use crate::error::{Error, ResourceKind, Result};
use crate::guard::Releasable;
use crate::model::SandboxId;
use async_trait::async_trait;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open page in the sandbox browser.
///
/// Clones share the connection. Commands are sent one at a time.
#[derive(Clone)]
pub struct BrowserSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    sandbox_id: SandboxId,
    ws: Mutex<Option<WsStream>>,
    next_id: AtomicU64,
    target_id: String,
    session_id: String,
    timeout: Duration,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("sandbox_id", &self.inner.sandbox_id)
            .field("target_id", &self.inner.target_id)
            .finish_non_exhaustive()
    }
}

impl BrowserSession {
    /// Connect to a CDP endpoint and open a blank page.
    pub(crate) async fn connect(
        sandbox_id: SandboxId,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::transport(format!("invalid CDP url: {e}")))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::transport(format!("invalid header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::transport(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        tracing::debug!(sandbox_id = %sandbox_id, "Connecting to browser");
        let (ws, _resp) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| Error::Timeout(timeout))?
            .map_err(|e| Error::transport(format!("CDP connect failed: {e}")))?;
        let mut ws = Some(ws);
        let next_id = AtomicU64::new(1);

        let target = exchange(
            &mut ws,
            &next_id,
            timeout,
            None,
            "Target.createTarget",
            json!({ "url": "about:blank" }),
        )
        .await?;
        let target_id = string_field(&target, "targetId")?;
        let attached = exchange(
            &mut ws,
            &next_id,
            timeout,
            None,
            "Target.attachToTarget",
            json!({ "targetId": target_id, "flatten": true }),
        )
        .await?;
        let session_id = string_field(&attached, "sessionId")?;

        tracing::info!(sandbox_id = %sandbox_id, target_id = %target_id, "Browser session opened");
        Ok(Self {
            inner: Arc::new(SessionInner {
                sandbox_id,
                ws: Mutex::new(ws),
                next_id,
                target_id,
                session_id,
                timeout,
            }),
        })
    }

    pub fn target_id(&self) -> &str {
        &self.inner.target_id
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value> {
        let mut ws = self.inner.ws.lock().await;
        exchange(
            &mut ws,
            &self.inner.next_id,
            self.inner.timeout,
            Some(self.inner.session_id.as_str()),
            method,
            params,
        )
        .await
    }

    /// Navigate the page. Returns once the browser has committed the
    /// navigation, without waiting for the load event.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        tracing::debug!(sandbox_id = %self.inner.sandbox_id, url = %url, "Navigating");
        let result = self.command("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(Error::RemoteExecution {
                message: format!("navigation to {url} failed: {error}"),
                payload: result.clone(),
            });
        }
        Ok(())
    }

    /// Evaluate a JavaScript expression and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let mut result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("evaluation failed")
                .to_string();
            return Err(Error::RemoteExecution {
                message,
                payload: details.clone(),
            });
        }
        Ok(result
            .pointer_mut("/result/value")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Full HTML of the current page.
    pub async fn content(&self) -> Result<String> {
        let html = self.evaluate("document.documentElement.outerHTML").await?;
        Ok(html.as_str().unwrap_or_default().to_string())
    }

    pub async fn title(&self) -> Result<String> {
        let title = self.evaluate("document.title").await?;
        Ok(title.as_str().unwrap_or_default().to_string())
    }

    /// Click the first element matching a CSS selector.
    pub async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            json!(selector)
        );
        self.expect_element(selector, self.evaluate(&script).await?)
    }

    /// Set the value of the first input matching a CSS selector.
    pub async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            json!(selector),
            json!(value)
        );
        self.expect_element(selector, self.evaluate(&script).await?)
    }

    fn expect_element(&self, selector: &str, found: Value) -> Result<()> {
        if found == Value::Bool(true) {
            return Ok(());
        }
        Err(Error::RemoteExecution {
            message: format!("no element matches selector {selector}"),
            payload: json!({ "selector": selector }),
        })
    }

    /// Capture the visible page as PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let result = self
            .command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let encoded = result.get("data").and_then(Value::as_str).ok_or_else(|| {
            Error::transport("screenshot response carried no image data")
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::transport(format!("invalid screenshot encoding: {e}")))
    }

    /// Close the page and the connection. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut ws = self.inner.ws.lock().await;
        if ws.is_none() {
            return Ok(());
        }
        let closed = exchange(
            &mut ws,
            &self.inner.next_id,
            self.inner.timeout,
            None,
            "Target.closeTarget",
            json!({ "targetId": self.inner.target_id }),
        )
        .await;
        if let Err(e) = closed {
            tracing::debug!(sandbox_id = %self.inner.sandbox_id, error = %e, "Target close failed");
        }
        if let Some(mut stream) = ws.take() {
            if let Err(e) = stream.close(None).await {
                tracing::debug!(sandbox_id = %self.inner.sandbox_id, error = %e, "WebSocket close failed");
            }
        }
        tracing::info!(sandbox_id = %self.inner.sandbox_id, target_id = %self.inner.target_id, "Browser session closed");
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.ws.lock().await.is_none()
    }
}

#[async_trait]
impl Releasable for BrowserSession {
    fn resource(&self) -> (ResourceKind, String) {
        (ResourceKind::BrowserSession, self.inner.target_id.clone())
    }

    async fn release(&self) -> Result<()> {
        self.close().await
    }
}

/// Send one command and wait for its response, skipping events. Fails
/// with [`Error::Timeout`] when the browser does not answer in time.
async fn exchange(
    ws: &mut Option<WsStream>,
    next_id: &AtomicU64,
    timeout: Duration,
    session_id: Option<&str>,
    method: &str,
    params: Value,
) -> Result<Value> {
    let ws = ws
        .as_mut()
        .ok_or_else(|| Error::invalid_state("open browser session", "closed"))?;
    let id = next_id.fetch_add(1, Ordering::Relaxed);
    let message = command_message(id, session_id, method, params);
    tracing::trace!(id, method = %method, "CDP command");

    let round_trip = async {
        ws.send(Message::Text(message.to_string().into()))
            .await
            .map_err(|e| Error::transport(format!("CDP send failed: {e}")))?;
        await_reply(&mut *ws, id, method).await
    };
    match tokio::time::timeout(timeout, round_trip).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(id, method = %method, timeout_secs = timeout.as_secs(), "CDP command timed out");
            Err(Error::Timeout(timeout))
        }
    }
}

async fn await_reply(ws: &mut WsStream, id: u64, method: &str) -> Result<Value> {
    while let Some(frame) = ws.next().await {
        let frame = frame.map_err(|e| Error::transport(format!("CDP receive failed: {e}")))?;
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let mut reply: Value = serde_json::from_str(text.as_str())?;
        if reply.get("id").and_then(Value::as_u64) != Some(id) {
            tracing::trace!(event = ?reply.get("method"), "CDP event");
            continue;
        }
        if let Some(error) = reply.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("CDP command failed");
            return Err(Error::RemoteExecution {
                message: format!("{method}: {message}"),
                payload: error.clone(),
            });
        }
        return Ok(reply.get_mut("result").map(Value::take).unwrap_or(Value::Null));
    }
    Err(Error::transport("CDP connection closed"))
}

fn command_message(id: u64, session_id: Option<&str>, method: &str, params: Value) -> Value {
    let mut message = json!({ "id": id, "method": method, "params": params });
    if let Some(session_id) = session_id {
        message["sessionId"] = json!(session_id);
    }
    message
}

fn string_field(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::transport(format!("CDP response is missing {key}")))
}
