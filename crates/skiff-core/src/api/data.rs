//! Request builders for the data endpoint.
//!
//! Paths are relative to the sandbox; [`DataApi`](super::DataApi) adds the
//! `/sandboxes/{id}` prefix.

use super::control::validate_id;
use crate::error::{Error, ResourceKind, Result};
use crate::model::CodeLanguage;
use crate::transport::{ApiRequest, Body, Method};
use bytes::Bytes;
use serde_json::json;
use std::time::Duration;

/// Timeout for code execution and commands when the caller sets none.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

fn require_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(Error::Validation("path must not be empty".into()));
    }
    Ok(())
}

fn require_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::Validation("timeout must be > 0".into()));
    }
    Ok(())
}

pub(crate) fn health() -> ApiRequest {
    ApiRequest::data(Method::Get, "/health")
}

// Contexts

pub(crate) fn create_context(language: CodeLanguage, cwd: &str) -> Result<ApiRequest> {
    require_path(cwd)?;
    Ok(ApiRequest::data(Method::Post, "/contexts").json(json!({
        "cwd": cwd,
        "language": language,
    })))
}

pub(crate) fn list_contexts() -> ApiRequest {
    ApiRequest::data(Method::Get, "/contexts")
}

pub(crate) fn get_context(id: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Context, id)?;
    Ok(ApiRequest::data(Method::Get, format!("/contexts/{id}")).resource(ResourceKind::Context, id))
}

pub(crate) fn delete_context(id: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Context, id)?;
    Ok(ApiRequest::data(Method::Delete, format!("/contexts/{id}"))
        .resource(ResourceKind::Context, id))
}

pub(crate) fn execute(
    code: &str,
    context_id: Option<&str>,
    language: Option<CodeLanguage>,
    timeout: Option<Duration>,
) -> Result<ApiRequest> {
    if code.trim().is_empty() {
        return Err(Error::Validation("code must not be empty".into()));
    }
    let timeout = timeout.unwrap_or(DEFAULT_EXEC_TIMEOUT);
    require_timeout(timeout)?;

    let mut body = json!({
        "code": code,
        "timeout": timeout.as_secs().max(1),
    });
    let mut request = ApiRequest::data(Method::Post, "/contexts/execute").timeout(timeout);
    if let Some(id) = context_id {
        validate_id(ResourceKind::Context, id)?;
        body["contextId"] = json!(id);
        request = request.resource(ResourceKind::Context, id);
    }
    // A bound context already has a language; unbound runs need one.
    match (context_id, language) {
        (_, Some(language)) => body["language"] = json!(language),
        (None, None) => body["language"] = json!(CodeLanguage::default()),
        (Some(_), None) => {}
    }
    Ok(request.json(body))
}

// Files

pub(crate) fn read_file(path: &str) -> Result<ApiRequest> {
    require_path(path)?;
    Ok(ApiRequest::data(Method::Get, "/files")
        .query("path", path)
        .resource(ResourceKind::File, path))
}

pub(crate) fn write_file(
    path: &str,
    content: &str,
    mode: &str,
    encoding: &str,
    create_dir: bool,
) -> Result<ApiRequest> {
    require_path(path)?;
    Ok(ApiRequest::data(Method::Post, "/files")
        .resource(ResourceKind::File, path)
        .json(json!({
            "path": path,
            "content": content,
            "mode": mode,
            "encoding": encoding,
            "createDir": create_dir,
        })))
}

// Filesystem

pub(crate) fn list_directory(path: Option<&str>, depth: Option<u32>) -> Result<ApiRequest> {
    if let Some(path) = path {
        require_path(path)?;
    }
    if depth == Some(0) {
        return Err(Error::Validation("depth must be > 0".into()));
    }
    let request = ApiRequest::data(Method::Get, "/filesystem")
        .query_opt("path", path)
        .query_opt("depth", depth);
    Ok(match path {
        Some(path) => request.resource(ResourceKind::File, path),
        None => request,
    })
}

pub(crate) fn stat(path: &str) -> Result<ApiRequest> {
    require_path(path)?;
    Ok(ApiRequest::data(Method::Get, "/filesystem/stat")
        .query("path", path)
        .resource(ResourceKind::File, path))
}

pub(crate) fn mkdir(path: &str, parents: bool, mode: &str) -> Result<ApiRequest> {
    require_path(path)?;
    Ok(ApiRequest::data(Method::Post, "/filesystem/mkdir")
        .resource(ResourceKind::File, path)
        .json(json!({ "path": path, "parents": parents, "mode": mode })))
}

pub(crate) fn move_path(source: &str, destination: &str) -> Result<ApiRequest> {
    require_path(source)?;
    require_path(destination)?;
    Ok(ApiRequest::data(Method::Post, "/filesystem/move")
        .resource(ResourceKind::File, source)
        .json(json!({ "source": source, "destination": destination })))
}

pub(crate) fn remove(path: &str) -> Result<ApiRequest> {
    require_path(path)?;
    Ok(ApiRequest::data(Method::Post, "/filesystem/remove")
        .resource(ResourceKind::File, path)
        .json(json!({ "path": path })))
}

pub(crate) fn upload(remote_path: &str, file_name: &str, bytes: Bytes) -> Result<ApiRequest> {
    require_path(remote_path)?;
    Ok(ApiRequest::data(Method::Post, "/filesystem/upload")
        .resource(ResourceKind::File, remote_path)
        .body(Body::Multipart {
            field: "file".into(),
            file_name: file_name.to_string(),
            bytes,
            fields: vec![("path".into(), remote_path.to_string())],
        }))
}

pub(crate) fn download(remote_path: &str) -> Result<ApiRequest> {
    require_path(remote_path)?;
    Ok(ApiRequest::data(Method::Get, "/filesystem/download")
        .query("path", remote_path)
        .resource(ResourceKind::File, remote_path))
}

// Processes

pub(crate) fn cmd(command: &str, cwd: Option<&str>, timeout: Option<Duration>) -> Result<ApiRequest> {
    if command.trim().is_empty() {
        return Err(Error::Validation("command must not be empty".into()));
    }
    let timeout = timeout.unwrap_or(DEFAULT_EXEC_TIMEOUT);
    require_timeout(timeout)?;
    let mut body = json!({ "command": command, "timeout": timeout.as_secs().max(1) });
    if let Some(cwd) = cwd {
        require_path(cwd)?;
        body["cwd"] = json!(cwd);
    }
    Ok(ApiRequest::data(Method::Post, "/processes/cmd")
        .timeout(timeout)
        .json(body))
}

pub(crate) fn list_processes() -> ApiRequest {
    ApiRequest::data(Method::Get, "/processes")
}

pub(crate) fn get_process(pid: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Process, pid)?;
    Ok(ApiRequest::data(Method::Get, format!("/processes/{pid}")).resource(ResourceKind::Process, pid))
}

pub(crate) fn kill_process(pid: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Process, pid)?;
    Ok(ApiRequest::data(Method::Delete, format!("/processes/{pid}"))
        .resource(ResourceKind::Process, pid))
}

// Recordings

pub(crate) fn list_recordings() -> ApiRequest {
    ApiRequest::data(Method::Get, "/recordings")
}

pub(crate) fn download_recording(filename: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Recording, filename)?;
    Ok(ApiRequest::data(Method::Get, format!("/recordings/{filename}"))
        .resource(ResourceKind::Recording, filename))
}

pub(crate) fn delete_recording(filename: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Recording, filename)?;
    Ok(ApiRequest::data(Method::Delete, format!("/recordings/{filename}"))
        .resource(ResourceKind::Recording, filename))
}
