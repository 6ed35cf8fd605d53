//! Canonical operation plumbing.
//!
//! Every operation is a pure request builder (see [`control`] and [`data`],
//! which validate their input before anything is sent), one
//! [`Transport::send`], and a typed decode. The async facades and the
//! blocking wrappers both run through this path.

pub(crate) mod control;
pub(crate) mod data;

use crate::config::Config;
use crate::error::{Error, ResourceKind, Result};
use crate::model::SandboxId;
use crate::transport::{ApiRequest, ApiResponse, Endpoint, Transport, DATA_TOKEN_HEADER};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Extra time the client waits beyond an operation's own timeout before
/// giving up, so the server can report the timeout itself.
pub const DEADLINE_GRACE: Duration = Duration::from_secs(10);

/// Shared transport plus resolved configuration.
#[derive(Clone)]
pub(crate) struct Api {
    transport: Arc<dyn Transport>,
    config: Arc<Config>,
}

impl Api {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: Arc<Config>) -> Self {
        Self { transport, config }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Send a request under the client-side deadline.
    ///
    /// Returns the raw response whatever its status.
    pub(crate) async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        if request.endpoint == Endpoint::Control && !self.config.credentials.has_access_key() {
            return Err(Error::Config(
                "an access key pair is required for control-endpoint operations".into(),
            ));
        }

        let op_timeout = request.timeout.unwrap_or(self.config.timeout);
        let deadline = op_timeout + DEADLINE_GRACE;
        request.timeout = Some(deadline);

        let method = request.method;
        let path = request.path.clone();
        let start = Instant::now();
        tracing::trace!(method = %method, path = %path, body = ?request.json_body(), "Request body");

        match tokio::time::timeout(deadline, self.transport.send(request)).await {
            Ok(result) => {
                if let Ok(ref response) = result {
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        status = response.status,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Call completed"
                    );
                }
                // The transport only knows the padded deadline.
                result.map_err(|e| match e {
                    Error::Timeout(_) => Error::Timeout(op_timeout),
                    other => other,
                })
            }
            Err(_) => {
                tracing::warn!(
                    method = %method,
                    path = %path,
                    timeout_secs = op_timeout.as_secs(),
                    "Call exceeded client deadline"
                );
                Err(Error::Timeout(op_timeout))
            }
        }
    }

    /// Send a request and decode its payload.
    pub(crate) async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let endpoint = request.endpoint;
        let resource = request.resource.clone();
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let response = self.send(request).await?;
        check_status(&response, resource.as_ref(), timeout)?;
        decode(endpoint, &response)
    }

    /// Send a request whose payload is irrelevant.
    pub(crate) async fn execute(&self, request: ApiRequest) -> Result<()> {
        let resource = request.resource.clone();
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let response = self.send(request).await?;
        check_status(&response, resource.as_ref(), timeout)
    }

    /// Send a request and return the raw body bytes.
    pub(crate) async fn call_bytes(&self, request: ApiRequest) -> Result<Bytes> {
        let resource = request.resource.clone();
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let response = self.send(request).await?;
        check_status(&response, resource.as_ref(), timeout)?;
        Ok(response.body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessToken {
    access_token: String,
}

/// Data-plane calls scoped to one sandbox.
///
/// Requests built by [`data`] carry paths relative to the sandbox; this
/// type prefixes them, attaches the access token and fills in the sandbox
/// as the addressed resource when the builder did not name a narrower one.
#[derive(Clone)]
pub(crate) struct DataApi {
    api: Api,
    sandbox_id: SandboxId,
    token: Arc<OnceCell<String>>,
}

impl DataApi {
    pub(crate) fn new(api: Api, sandbox_id: SandboxId) -> Self {
        Self {
            api,
            sandbox_id,
            token: Arc::new(OnceCell::new()),
        }
    }

    /// Configured per-operation timeout.
    pub(crate) fn timeout(&self) -> Duration {
        self.api.config().timeout
    }

    pub(crate) fn sandbox_id(&self) -> &SandboxId {
        &self.sandbox_id
    }

    /// Data-plane access token, fetched from the control endpoint on first
    /// use unless one was configured.
    pub(crate) async fn token(&self) -> Result<String> {
        if let Some(token) = self
            .api
            .config()
            .credentials
            .data_token
            .as_ref()
            .filter(|t| !t.is_empty())
        {
            return Ok(token.clone());
        }
        let token = self
            .token
            .get_or_try_init(|| async {
                tracing::debug!(sandbox_id = %self.sandbox_id, "Fetching data-plane access token");
                let request = control::access_token(self.sandbox_id.as_str())?;
                let token: AccessToken = self.api.call(request).await?;
                Ok::<_, Error>(token.access_token)
            })
            .await?;
        Ok(token.clone())
    }

    async fn prepare(&self, mut request: ApiRequest) -> Result<ApiRequest> {
        request.path = format!("/sandboxes/{}{}", self.sandbox_id, request.path);
        if request.resource.is_none() {
            request.resource = Some((ResourceKind::Sandbox, self.sandbox_id.to_string()));
        }
        let token = self.token().await?;
        Ok(request.header(DATA_TOKEN_HEADER, token))
    }

    pub(crate) async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request = self.prepare(request).await?;
        self.api.send(request).await
    }

    pub(crate) async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let request = self.prepare(request).await?;
        self.api.call(request).await
    }

    /// Call an endpoint returning a list, either bare or wrapped in an
    /// object. An empty body is an empty list.
    pub(crate) async fn call_list<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Vec<T>> {
        let list: Option<ItemList<T>> = self.call(request).await?;
        Ok(list.map(ItemList::into_vec).unwrap_or_default())
    }

    pub(crate) async fn execute(&self, request: ApiRequest) -> Result<()> {
        let request = self.prepare(request).await?;
        self.api.execute(request).await
    }

    pub(crate) async fn call_bytes(&self, request: ApiRequest) -> Result<Bytes> {
        let request = self.prepare(request).await?;
        self.api.call_bytes(request).await
    }

    /// WebSocket URL for a sandbox stream (`/ws/automation`, `/ws/liveview`).
    pub(crate) fn ws_url(&self, path: &str, record: bool) -> Result<String> {
        let config = self.api.config();
        let base = config.data_endpoint()?;
        let base = match base.split_once("://") {
            Some(("https", rest)) => format!("wss://{rest}"),
            Some(("http", rest)) => format!("ws://{rest}"),
            _ => base,
        };
        let mut url = format!(
            "{base}/sandboxes/{}{path}?tenantId={}",
            self.sandbox_id,
            config.account_id()?
        );
        if record {
            url.push_str("&recording=true");
        }
        Ok(url)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemList<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(
            alias = "contexts",
            alias = "processes",
            alias = "recordings",
            alias = "entries",
            alias = "files"
        )]
        items: Vec<T>,
    },
}

impl<T> ItemList<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { items } => items,
        }
    }
}

/// Map a non-2xx response to an error.
pub(crate) fn check_status(
    response: &ApiResponse,
    resource: Option<&(ResourceKind, String)>,
    timeout: Duration,
) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }

    let payload: Value = serde_json::from_slice(&response.body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&response.body).into_owned()));
    let message = error_message(&payload).unwrap_or_else(|| format!("HTTP {}", response.status));
    let transport = || Error::Transport {
        status: Some(response.status),
        message: message.clone(),
        request_id: response.request_id.clone(),
    };
    let already_exists = message.to_ascii_lowercase().contains("already exists");

    tracing::debug!(
        status = response.status,
        request_id = ?response.request_id,
        message = %message,
        "Call failed"
    );

    let err = match (response.status, resource) {
        (404, Some((kind, id))) => Error::NotFound {
            kind: *kind,
            id: id.clone(),
        },
        (409, Some((kind, id))) => Error::Conflict {
            kind: *kind,
            id: id.clone(),
        },
        (400 | 500, Some((kind, id))) if already_exists => Error::Conflict {
            kind: *kind,
            id: id.clone(),
        },
        (408 | 504, _) => Error::Timeout(timeout),
        (500..=599, _) | (404 | 409, None) => transport(),
        _ => Error::RemoteExecution { message, payload },
    };
    Err(err)
}

fn error_message(payload: &Value) -> Option<String> {
    let text = match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["message", "Message", "errorMessage", "error"]
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(|v| v.as_str().or_else(|| v.get("message").and_then(Value::as_str))),
        _ => None,
    };
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decode a successful response body.
///
/// Control-endpoint payloads are wrapped in `{"requestId", "data"}`;
/// data-endpoint payloads are bare. An empty body decodes as `null`.
pub(crate) fn decode<T: DeserializeOwned>(endpoint: Endpoint, response: &ApiResponse) -> Result<T> {
    let undecodable = |e: serde_json::Error| Error::Transport {
        status: Some(response.status),
        message: format!("undecodable response body: {e}"),
        request_id: response.request_id.clone(),
    };

    let mut value: Value = if response.body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&response.body).map_err(undecodable)?
    };
    if endpoint == Endpoint::Control {
        if let Some(data) = value.get_mut("data") {
            value = data.take();
        }
    }
    serde_json::from_value(value).map_err(undecodable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{SandboxInfo, SandboxStatus};
    use crate::transport::Method;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn resource() -> (ResourceKind, String) {
        (ResourceKind::Sandbox, "sb-1".to_string())
    }

    fn status(code: u16, body: Value) -> Error {
        check_status(
            &ApiResponse::json(code, &body),
            Some(&resource()),
            Duration::from_secs(5),
        )
        .unwrap_err()
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status(404, json!({"message": "nope"})),
            Error::NotFound { kind: ResourceKind::Sandbox, ref id } if id == "sb-1"
        ));
        assert_eq!(status(409, json!({})).kind(), ErrorKind::Conflict);
        assert_eq!(
            status(400, json!({"message": "Template t1 already exists"})).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            status(500, json!({"code": "X", "message": "resource Already Exists"})).kind(),
            ErrorKind::Conflict
        );
        assert!(matches!(status(504, json!({})), Error::Timeout(d) if d == Duration::from_secs(5)));
        assert!(matches!(
            status(503, json!({"message": "busy"})),
            Error::Transport { status: Some(503), ref message, .. } if message == "busy"
        ));
        assert_eq!(
            status(400, json!({"message": "bad path"})).kind(),
            ErrorKind::RemoteExecution
        );
    }

    #[test]
    fn test_not_found_without_resource_is_transport() {
        let err = check_status(&ApiResponse::new(404, ""), None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Transport { status: Some(404), .. }));
    }

    #[test]
    fn test_plain_text_error_message() {
        let err = check_status(
            &ApiResponse::new(403, "forbidden\n"),
            Some(&resource()),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::RemoteExecution { ref message, .. } if message == "forbidden"));
    }

    #[test]
    fn test_decode_control_envelope() {
        let resp = ApiResponse::json(
            200,
            &json!({"requestId": "r1", "data": {"sandboxId": "sb-1", "status": "RUNNING"}}),
        );
        let info: SandboxInfo = decode(Endpoint::Control, &resp).unwrap();
        assert_eq!(info.status, SandboxStatus::Running);
    }

    #[test]
    fn test_decode_data_is_bare_and_empty_is_null() {
        let resp = ApiResponse::json(200, &json!({"data": 1}));
        let value: Value = decode(Endpoint::Data, &resp).unwrap();
        assert_eq!(value, json!({"data": 1}));

        decode::<()>(Endpoint::Data, &ApiResponse::new(204, "")).unwrap();
        let missing: Option<SandboxInfo> = decode(Endpoint::Data, &ApiResponse::new(200, " ")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_decode_garbage_is_transport() {
        let err = decode::<SandboxInfo>(Endpoint::Control, &ApiResponse::new(200, "<html>")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_item_list_shapes() {
        let bare: ItemList<u32> = serde_json::from_value(json!([1, 2])).unwrap();
        assert_eq!(bare.into_vec(), vec![1, 2]);
        let wrapped: ItemList<u32> = serde_json::from_value(json!({"recordings": [3]})).unwrap();
        assert_eq!(wrapped.into_vec(), vec![3]);
    }

    struct Recorder {
        requests: Mutex<Vec<ApiRequest>>,
        delay: Option<Duration>,
        response: ApiResponse,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
            self.requests.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.response.clone())
        }
    }

    fn api(recorder: Arc<Recorder>, config: Config) -> Api {
        Api::new(recorder, Arc::new(config))
    }

    fn recorder(response: ApiResponse, delay: Option<Duration>) -> Arc<Recorder> {
        Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
            delay,
            response,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_deadline_is_timeout_plus_grace() {
        let rec = recorder(ApiResponse::new(200, ""), Some(Duration::from_secs(3600)));
        let config = Config::builder().access_key("id", "secret").build().unwrap();
        let err = api(rec.clone(), config)
            .execute(ApiRequest::control(Method::Get, "/x").timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(5)));
        let sent = rec.requests.lock().unwrap();
        assert_eq!(sent[0].timeout, Some(Duration::from_secs(15)));
    }

    struct TimingOut;

    #[async_trait]
    impl Transport for TimingOut {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
            Err(Error::Timeout(request.timeout.unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn test_transport_timeout_reports_operation_timeout() {
        let config = Config::builder().access_key("id", "secret").build().unwrap();
        let api = Api::new(Arc::new(TimingOut), Arc::new(config));
        let err = api
            .execute(ApiRequest::control(Method::Get, "/x").timeout(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_control_call_requires_access_key() {
        let rec = recorder(ApiResponse::new(200, ""), None);
        let config = Config::builder().data_token("tok").build().unwrap();
        let err = api(rec.clone(), config)
            .execute(ApiRequest::control(Method::Get, "/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(rec.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_api_prefixes_path_and_uses_configured_token() {
        let rec = recorder(ApiResponse::json(200, &json!([])), None);
        let config = Config::builder().data_token("tok").build().unwrap();
        let data = DataApi::new(api(rec.clone(), config), SandboxId::new("sb-9"));
        let items: Vec<Value> = data
            .call_list(ApiRequest::data(Method::Get, "/processes"))
            .await
            .unwrap();
        assert!(items.is_empty());

        let sent = rec.requests.lock().unwrap();
        assert_eq!(sent[0].path, "/sandboxes/sb-9/processes");
        assert!(sent[0]
            .headers
            .contains(&(DATA_TOKEN_HEADER.to_string(), "tok".to_string())));
        assert_eq!(
            sent[0].resource,
            Some((ResourceKind::Sandbox, "sb-9".to_string()))
        );
    }

    #[tokio::test]
    async fn test_data_token_fetched_once() {
        let rec = recorder(
            ApiResponse::json(200, &json!({"requestId": "r", "data": {"accessToken": "fetched"}})),
            None,
        );
        let config = Config::builder().access_key("id", "secret").build().unwrap();
        let data = DataApi::new(api(rec.clone(), config), SandboxId::new("sb-1"));
        assert_eq!(data.token().await.unwrap(), "fetched");
        assert_eq!(data.token().await.unwrap(), "fetched");
        assert_eq!(rec.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_ws_url() {
        let rec = recorder(ApiResponse::new(200, ""), None);
        let config = Config::builder()
            .data_token("tok")
            .account_id("1234")
            .region("cn-beijing")
            .build()
            .unwrap();
        let data = DataApi::new(api(rec, config), SandboxId::new("sb-1"));
        assert_eq!(
            data.ws_url("/ws/automation", false).unwrap(),
            "wss://1234.agentrun-data.cn-beijing.aliyuncs.com/sandboxes/sb-1/ws/automation?tenantId=1234"
        );
        assert!(data
            .ws_url("/ws/liveview", true)
            .unwrap()
            .ends_with("/ws/liveview?tenantId=1234&recording=true"));
    }
}
