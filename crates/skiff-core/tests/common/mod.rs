//! In-memory stand-in for the control and data endpoints.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use skiff_core::transport::{ApiRequest, ApiResponse, Body, Endpoint, Method, Transport};
use skiff_core::{Client, Config};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted behaviour and observable state of the fake service.
#[derive(Default)]
pub struct State {
    pub calls: Vec<ApiRequest>,
    pub templates: BTreeMap<String, Value>,
    pub sandboxes: BTreeMap<String, Value>,
    pub contexts: BTreeMap<String, FakeContext>,
    pub files: BTreeMap<String, String>,
    pub recordings: BTreeMap<String, Vec<u8>>,
    /// Status reported for new sandboxes (default `RUNNING`).
    pub initial_status: Option<String>,
    /// Template type reported for new sandboxes, overriding the template's.
    pub reported_type: Option<String>,
    /// Status code returned by `/health` instead of a healthy body.
    pub health_status: Option<u16>,
    /// Fail every sandbox delete with this status.
    pub delete_status: Option<u16>,
    /// Fail template listing with this status.
    pub list_status: Option<u16>,
    next_id: u64,
}

#[derive(Default, Clone)]
pub struct FakeContext {
    pub language: String,
    pub vars: HashMap<String, String>,
}

#[derive(Default)]
pub struct FakeServer {
    pub state: Mutex<State>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_state(&self, f: impl FnOnce(&mut State)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn add_template(&self, name: &str, template_type: &str) {
        self.with_state(|s| {
            s.templates.insert(name.into(), template_json(name, template_type));
        });
    }

    pub fn add_recording(&self, filename: &str, bytes: &[u8]) {
        self.with_state(|s| {
            s.recordings.insert(filename.into(), bytes.to_vec());
        });
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Number of calls with `method` whose path ends with `suffix`.
    pub fn count(&self, method: Method, suffix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path.ends_with(suffix))
            .count()
    }

    pub fn sandbox_deletes(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                c.endpoint == Endpoint::Control
                    && c.method == Method::Delete
                    && c.path.ends_with(&format!("/sandboxes/{id}"))
            })
            .count()
    }

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state.lock().unwrap();
        state.calls.push(request.clone());
        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        match request.endpoint {
            // First segment is the API version.
            Endpoint::Control => control(&mut state, request, &segments[1..]),
            Endpoint::Data => match segments.as_slice() {
                ["sandboxes", id, rest @ ..] => data(&mut state, request, id, rest),
                _ => not_found("no such route"),
            },
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: ApiRequest) -> skiff_core::Result<ApiResponse> {
        Ok(self.handle(&request))
    }
}

/// Holds matching calls for a while before the fake service sees them.
pub struct Delayed {
    pub server: Arc<FakeServer>,
    rules: Vec<(Method, String, Duration)>,
    completed: AtomicUsize,
}

impl Delayed {
    pub fn new(server: &Arc<FakeServer>) -> Self {
        Self {
            server: server.clone(),
            rules: Vec::new(),
            completed: AtomicUsize::new(0),
        }
    }

    /// Delay calls with `method` whose path ends with `suffix`.
    pub fn delay(mut self, method: Method, suffix: &str, by: Duration) -> Arc<Self> {
        self.rules.push((method, suffix.to_string(), by));
        Arc::new(self)
    }

    /// Delayed calls that ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for Delayed {
    async fn send(&self, request: ApiRequest) -> skiff_core::Result<ApiResponse> {
        let delay = self
            .rules
            .iter()
            .find(|(method, suffix, _)| request.method == *method && request.path.ends_with(suffix.as_str()))
            .map(|(_, _, by)| *by);
        let Some(delay) = delay else {
            return Ok(self.server.handle(&request));
        };
        tokio::time::sleep(delay).await;
        let response = self.server.handle(&request);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(response)
    }
}

pub fn delayed_client(transport: &Arc<Delayed>) -> Client {
    Client::with_transport(config(), transport.clone()).unwrap()
}

pub fn config() -> Config {
    Config::builder()
        .access_key("test-ak", "test-secret")
        .account_id("1234567890")
        .control_endpoint("http://control.test")
        .data_endpoint("http://data.test")
        .build()
        .unwrap()
}

pub fn client(server: &Arc<FakeServer>) -> Client {
    Client::with_transport(config(), server.clone()).unwrap()
}

pub fn blocking_client(server: &Arc<FakeServer>) -> skiff_core::blocking::Client {
    skiff_core::blocking::Client::with_transport(config(), server.clone()).unwrap()
}

pub fn template_json(name: &str, template_type: &str) -> Value {
    json!({
        "templateId": format!("tpl-{name}"),
        "templateName": name,
        "templateType": template_type,
        "status": "READY",
    })
}

fn envelope(data: Value) -> ApiResponse {
    ApiResponse::json(200, &json!({ "requestId": "req-fake", "data": data }))
}

fn ok(value: Value) -> ApiResponse {
    ApiResponse::json(200, &value)
}

fn error(status: u16, message: &str) -> ApiResponse {
    ApiResponse::json(status, &json!({ "message": message }))
}

fn not_found(message: &str) -> ApiResponse {
    error(404, message)
}

fn body(request: &ApiRequest) -> Value {
    request.json_body().cloned().unwrap_or(Value::Null)
}

fn control(state: &mut State, request: &ApiRequest, segments: &[&str]) -> ApiResponse {
    match (request.method, segments) {
        (Method::Post, ["templates"]) => {
            let input = body(request);
            let name = input["templateName"].as_str().unwrap_or_default().to_string();
            if state.templates.contains_key(&name) {
                return error(409, "template already exists");
            }
            let mut template = input.clone();
            template["templateId"] = json!(format!("tpl-{name}"));
            template["status"] = json!("READY");
            state.templates.insert(name, template.clone());
            envelope(template)
        }
        (Method::Get, ["templates"]) => {
            if let Some(status) = state.list_status {
                return error(status, "listing unavailable");
            }
            let page: usize = request.query_value("pageNumber").unwrap().parse().unwrap();
            let size: usize = request.query_value("pageSize").unwrap().parse().unwrap();
            let items: Vec<Value> = state
                .templates
                .values()
                .skip((page - 1) * size)
                .take(size)
                .cloned()
                .collect();
            envelope(json!({ "items": items, "total": state.templates.len() }))
        }
        (Method::Get, ["templates", name]) => match state.templates.get(*name) {
            Some(t) => envelope(t.clone()),
            None => not_found("template not found"),
        },
        (Method::Put, ["templates", name]) => match state.templates.get_mut(*name) {
            Some(t) => {
                if let Value::Object(update) = body(request) {
                    for (k, v) in update {
                        t[k] = v;
                    }
                }
                envelope(t.clone())
            }
            None => not_found("template not found"),
        },
        (Method::Delete, ["templates", name]) => match state.templates.remove(*name) {
            Some(_) => envelope(Value::Null),
            None => not_found("template not found"),
        },
        (Method::Post, ["sandboxes"]) => {
            let input = body(request);
            let template_name = input["templateName"].as_str().unwrap_or_default();
            let Some(template) = state.templates.get(template_name) else {
                return not_found("template not found");
            };
            let template_type = state
                .reported_type
                .clone()
                .map(Value::String)
                .unwrap_or_else(|| template["templateType"].clone());
            state.next_id += 1;
            let id = input["sandboxId"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("sb-{}", state.next_id));
            if state.sandboxes.contains_key(&id) {
                return error(400, "sandbox already exists");
            }
            let sandbox = json!({
                "sandboxId": id,
                "templateName": template_name,
                "templateType": template_type,
                "status": state.initial_status.clone().unwrap_or_else(|| "RUNNING".into()),
                "createdAt": "2026-01-01T00:00:00Z",
            });
            state.sandboxes.insert(id, sandbox.clone());
            envelope(sandbox)
        }
        (Method::Get, ["sandboxes"]) => {
            let sandboxes: Vec<Value> = state.sandboxes.values().cloned().collect();
            envelope(json!({ "sandboxes": sandboxes }))
        }
        (Method::Get, ["sandboxes", id]) => match state.sandboxes.get(*id) {
            Some(s) => envelope(s.clone()),
            None => not_found("sandbox not found"),
        },
        (Method::Post, ["sandboxes", id, "stop"]) => match state.sandboxes.get_mut(*id) {
            Some(s) => {
                s["status"] = json!("STOPPED");
                envelope(s.clone())
            }
            None => not_found("sandbox not found"),
        },
        (Method::Delete, ["sandboxes", id]) => {
            if let Some(status) = state.delete_status {
                return error(status, "delete failed");
            }
            match state.sandboxes.remove(*id) {
                Some(mut s) => {
                    s["status"] = json!("DELETED");
                    envelope(s)
                }
                None => not_found("sandbox not found"),
            }
        }
        (Method::Post, ["accessToken"]) => {
            let id = body(request)["resourceId"].as_str().unwrap_or_default().to_string();
            envelope(json!({ "accessToken": format!("token-{id}") }))
        }
        _ => not_found("no such route"),
    }
}

fn data(state: &mut State, request: &ApiRequest, id: &str, rest: &[&str]) -> ApiResponse {
    if !state.sandboxes.contains_key(id) {
        return not_found("sandbox not found");
    }
    match (request.method, rest) {
        (Method::Get, ["health"]) => match state.health_status {
            Some(status) => ApiResponse::new(status, ""),
            None => ok(json!({ "status": "ok" })),
        },
        (Method::Post, ["contexts"]) => {
            let input = body(request);
            state.next_id += 1;
            let context_id = format!("ctx-{}", state.next_id);
            let language = input["language"].as_str().unwrap_or("python").to_string();
            state.contexts.insert(
                context_id.clone(),
                FakeContext {
                    language: language.clone(),
                    vars: HashMap::new(),
                },
            );
            ok(json!({ "id": context_id, "language": language, "cwd": input["cwd"] }))
        }
        (Method::Get, ["contexts"]) => {
            let items: Vec<Value> = state
                .contexts
                .iter()
                .map(|(id, c)| json!({ "id": id, "language": c.language }))
                .collect();
            ok(json!({ "contexts": items }))
        }
        (Method::Post, ["contexts", "execute"]) => {
            let input = body(request);
            let code = input["code"].as_str().unwrap_or_default();
            match input["contextId"].as_str() {
                Some(context_id) => match state.contexts.get_mut(context_id) {
                    Some(ctx) => ok(run_code(&mut ctx.vars, code, Some(context_id))),
                    None => not_found("context not found"),
                },
                None => ok(run_code(&mut HashMap::new(), code, None)),
            }
        }
        (Method::Get, ["contexts", context_id]) => match state.contexts.get(*context_id) {
            Some(c) => ok(json!({ "id": context_id, "language": c.language })),
            None => not_found("context not found"),
        },
        (Method::Delete, ["contexts", context_id]) => match state.contexts.remove(*context_id) {
            Some(_) => ApiResponse::new(200, ""),
            None => not_found("context not found"),
        },
        (Method::Get, ["files"]) => {
            let path = request.query_value("path").unwrap_or_default();
            match state.files.get(path) {
                Some(content) => ok(json!({ "path": path, "content": content })),
                None => not_found("file not found"),
            }
        }
        (Method::Post, ["files"]) => {
            let input = body(request);
            let path = input["path"].as_str().unwrap_or_default().to_string();
            let content = input["content"].as_str().unwrap_or_default().to_string();
            state.files.insert(path, content);
            ApiResponse::new(200, "")
        }
        (Method::Get, ["filesystem", "download"]) => {
            let path = request.query_value("path").unwrap_or_default();
            match state.files.get(path) {
                Some(content) => ApiResponse::new(200, content.clone()),
                None => not_found("file not found"),
            }
        }
        (Method::Post, ["filesystem", "upload"]) => match &request.body {
            Body::Multipart { bytes, fields, .. } => {
                let path = fields
                    .iter()
                    .find(|(k, _)| k == "path")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                state
                    .files
                    .insert(path.clone(), String::from_utf8_lossy(bytes).into_owned());
                ok(json!({ "path": path, "size": bytes.len() }))
            }
            _ => error(400, "multipart body required"),
        },
        (Method::Get, ["filesystem", "stat"]) => {
            let path = request.query_value("path").unwrap_or_default();
            match state.files.get(path) {
                Some(content) => ok(json!({ "path": path, "size": content.len(), "isDir": false })),
                None => not_found("file not found"),
            }
        }
        (Method::Post, ["processes", "cmd"]) => {
            let command = body(request)["command"].as_str().unwrap_or_default().to_string();
            let result = match command.split_once(' ') {
                Some(("echo", text)) => json!({ "exitCode": 0, "stdout": format!("{text}\n") }),
                _ if command == "false" => json!({ "exitCode": 1, "stderr": "" }),
                _ => json!({ "exitCode": 127, "stderr": format!("{command}: not found\n") }),
            };
            ok(result)
        }
        (Method::Get, ["recordings"]) => {
            let items: Vec<Value> = state
                .recordings
                .iter()
                .map(|(name, bytes)| json!({ "filename": name, "size": bytes.len() }))
                .collect();
            ok(json!({ "recordings": items }))
        }
        (Method::Get, ["recordings", filename]) => match state.recordings.get(*filename) {
            Some(bytes) => ApiResponse::new(200, bytes.clone()),
            None => not_found("recording not found"),
        },
        (Method::Delete, ["recordings", filename]) => match state.recordings.remove(*filename) {
            Some(_) => ApiResponse::new(200, ""),
            None => not_found("recording not found"),
        },
        _ => not_found("no such route"),
    }
}

/// A tiny interpreter: `name = value` assigns, `print(name)` prints.
fn run_code(vars: &mut HashMap<String, String>, code: &str, context_id: Option<&str>) -> Value {
    let code = code.trim();
    let mut outputs = Vec::new();
    let mut error = Value::Null;
    if let Some(name) = code.strip_prefix("print(").and_then(|c| c.strip_suffix(')')) {
        match vars.get(name.trim()) {
            Some(value) => outputs.push(json!({ "type": "stdout", "text": format!("{value}\n") })),
            None => {
                error = json!({
                    "name": "NameError",
                    "value": format!("name '{}' is not defined", name.trim()),
                    "traceback": [],
                })
            }
        }
    } else if let Some((name, value)) = code.split_once('=') {
        vars.insert(name.trim().to_string(), value.trim().to_string());
    } else {
        outputs.push(json!({ "type": "result", "text": code }));
    }
    json!({ "contextId": context_id, "outputs": outputs, "error": error })
}
