//! Request/response transport seam.
//!
//! Everything above this module works with fully-formed [`ApiRequest`]s and
//! raw [`ApiResponse`]s. [`HttpTransport`] is the production implementation;
//! tests plug in an in-memory one.

use crate::config::Config;
use crate::error::{Error, ResourceKind, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the data-plane access token.
pub const DATA_TOKEN_HEADER: &str = "X-Sandbox-Access-Token";

const USER_AGENT: &str = concat!("skiff/", env!("CARGO_PKG_VERSION"));

/// Which service a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Template and sandbox management.
    Control,
    /// Sandbox-internal operations, scoped to one sandbox.
    Data,
}

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    /// A single file part plus plain text fields.
    Multipart {
        field: String,
        file_name: String,
        bytes: Bytes,
        fields: Vec<(String, String)>,
    },
}

/// A fully-formed request, ready for a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub method: Method,
    /// Path relative to the endpoint base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    /// Deadline for the whole exchange.
    pub timeout: Option<Duration>,
    /// Resource the request addresses, used to map 404/409 responses.
    pub resource: Option<(ResourceKind, String)>,
}

impl ApiRequest {
    /// Create a request with no query, headers or body.
    pub fn new(endpoint: Endpoint, method: Method, path: impl Into<String>) -> Self {
        Self {
            endpoint,
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
            timeout: None,
            resource: None,
        }
    }

    pub fn control(method: Method, path: impl Into<String>) -> Self {
        Self::new(Endpoint::Control, method, path)
    }

    pub fn data(method: Method, path: impl Into<String>) -> Self {
        Self::new(Endpoint::Data, method, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter when the value is present.
    pub fn query_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn resource(mut self, kind: ResourceKind, id: impl Into<String>) -> Self {
        self.resource = Some((kind, id.into()));
        self
    }

    /// The JSON body, if any.
    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    /// First query value for `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response as returned by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
    pub request_id: Option<String>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            request_id: None,
        }
    }

    /// Build a response carrying a JSON document.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one request/response exchange.
///
/// Every HTTP status is returned as an [`ApiResponse`]; only failures to
/// complete the exchange at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        (**self).send(request).await
    }
}

/// HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl HttpTransport {
    /// Create a transport for the given configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn base_url(&self, endpoint: Endpoint) -> Result<String> {
        match endpoint {
            Endpoint::Control => Ok(self.config.control_endpoint()),
            Endpoint::Data => self.config.data_endpoint(),
        }
    }

    fn build(&self, request: ApiRequest) -> Result<reqwest::RequestBuilder> {
        let url = format!("{}{}", self.base_url(request.endpoint)?, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, &url)
            .header("X-Client-Request-Id", uuid::Uuid::new_v4().to_string());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &self.config.headers {
            builder = builder.header(name, value);
        }

        let credentials = &self.config.credentials;
        if request.endpoint == Endpoint::Control {
            if let Some(id) = &credentials.access_key_id {
                builder = builder.header("X-Access-Key-Id", id);
            }
            if let Some(token) = &credentials.security_token {
                builder = builder.header("X-Security-Token", token);
            }
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Multipart {
                field,
                file_name,
                bytes,
                fields,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name);
                let form = fields
                    .into_iter()
                    .fold(reqwest::multipart::Form::new().part(field, part), |form, (k, v)| {
                        form.text(k, v)
                    });
                builder.multipart(form)
            }
        };
        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request.method;
        let path = request.path.clone();
        let timeout = request.timeout;
        tracing::debug!(method = %method, path = %path, "Sending request");

        let response = self.build(request)?.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(timeout.unwrap_or(self.config.timeout))
            } else {
                Error::transport(format!("{method} {path} failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let request_id = response
            .headers()
            .get("x-acs-request-id")
            .or_else(|| response.headers().get("x-request-id"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::transport(format!("failed to read response body: {e}")))?;

        tracing::debug!(method = %method, path = %path, status, "Received response");
        tracing::trace!(body_len = body.len(), "Response body");
        Ok(ApiResponse {
            status,
            body,
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let req = ApiRequest::data(Method::Get, "/sandboxes/sb-1/files")
            .query("path", "/tmp/a.txt")
            .query_opt::<u32>("depth", None)
            .resource(ResourceKind::File, "/tmp/a.txt");
        assert_eq!(req.endpoint, Endpoint::Data);
        assert_eq!(req.query_value("path"), Some("/tmp/a.txt"));
        assert_eq!(req.query_value("depth"), None);
        assert_eq!(req.body, Body::Empty);
        assert_eq!(
            req.resource,
            Some((ResourceKind::File, "/tmp/a.txt".to_string()))
        );
    }

    #[test]
    fn test_json_body_accessor() {
        let req = ApiRequest::control(Method::Post, "/x").json(json!({"a": 1}));
        assert_eq!(req.json_body(), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_response_success_range() {
        assert!(ApiResponse::new(200, "").is_success());
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(404, "").is_success());
        assert!(!ApiResponse::new(503, "").is_success());
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_http_transport_builds_data_url() {
        let config = Config::builder()
            .data_token("tok")
            .data_endpoint("http://localhost:1")
            .build()
            .unwrap();
        let transport = HttpTransport::new(Arc::new(config)).unwrap();
        assert_eq!(
            transport.base_url(Endpoint::Data).unwrap(),
            "http://localhost:1"
        );
    }
}
