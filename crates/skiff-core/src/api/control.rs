//! Request builders for the control endpoint.

use crate::error::{Error, ResourceKind, Result};
use crate::model::{
    ListSandboxesInput, PageableInput, SandboxInput, TemplateInput, TemplateUpdate,
};
use crate::transport::{ApiRequest, Method};
use serde_json::json;

/// API version prefix of control-endpoint paths.
pub const API_VERSION: &str = "2025-09-10";

fn path(suffix: &str) -> String {
    format!("/{API_VERSION}/{suffix}")
}

/// Reject identifiers that cannot be placed in a URL path segment.
pub(crate) fn validate_id(kind: ResourceKind, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::Validation(format!("{kind} id must not be empty")));
    }
    if id.contains(['/', '?', '#']) || id == "." || id == ".." {
        return Err(Error::Validation(format!("invalid {kind} id: {id}")));
    }
    Ok(())
}

pub(crate) fn create_template(input: TemplateInput) -> Result<ApiRequest> {
    let input = input.with_defaults();
    input.validate()?;
    Ok(ApiRequest::control(Method::Post, path("templates"))
        .resource(ResourceKind::Template, input.template_name.clone())
        .json(serde_json::to_value(&input)?))
}

pub(crate) fn get_template(name: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Template, name)?;
    Ok(ApiRequest::control(Method::Get, path(&format!("templates/{name}")))
        .resource(ResourceKind::Template, name))
}

pub(crate) fn update_template(name: &str, update: &TemplateUpdate) -> Result<ApiRequest> {
    validate_id(ResourceKind::Template, name)?;
    update.validate()?;
    Ok(ApiRequest::control(Method::Put, path(&format!("templates/{name}")))
        .resource(ResourceKind::Template, name)
        .json(serde_json::to_value(update)?))
}

pub(crate) fn delete_template(name: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Template, name)?;
    Ok(ApiRequest::control(Method::Delete, path(&format!("templates/{name}")))
        .resource(ResourceKind::Template, name))
}

pub(crate) fn list_templates(page: &PageableInput) -> Result<ApiRequest> {
    page.validate()?;
    Ok(ApiRequest::control(Method::Get, path("templates"))
        .query("pageNumber", page.page_number)
        .query("pageSize", page.page_size)
        .query_opt("templateType", page.template_type))
}

pub(crate) fn create_sandbox(input: &SandboxInput) -> Result<ApiRequest> {
    input.validate()?;
    let request = ApiRequest::control(Method::Post, path("sandboxes"))
        .json(serde_json::to_value(input)?);
    Ok(match &input.sandbox_id {
        Some(id) => request.resource(ResourceKind::Sandbox, id.clone()),
        None => request.resource(ResourceKind::Template, input.template_name.clone()),
    })
}

pub(crate) fn get_sandbox(id: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Sandbox, id)?;
    Ok(ApiRequest::control(Method::Get, path(&format!("sandboxes/{id}")))
        .resource(ResourceKind::Sandbox, id))
}

pub(crate) fn stop_sandbox(id: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Sandbox, id)?;
    Ok(ApiRequest::control(Method::Post, path(&format!("sandboxes/{id}/stop")))
        .resource(ResourceKind::Sandbox, id))
}

pub(crate) fn delete_sandbox(id: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Sandbox, id)?;
    Ok(ApiRequest::control(Method::Delete, path(&format!("sandboxes/{id}")))
        .resource(ResourceKind::Sandbox, id))
}

pub(crate) fn list_sandboxes(input: &ListSandboxesInput) -> Result<ApiRequest> {
    if input.max_results == Some(0) {
        return Err(Error::Validation("max_results must be > 0".into()));
    }
    let status = input
        .status
        .map(|s| serde_json::to_value(s).map(|v| v.as_str().unwrap_or_default().to_string()))
        .transpose()?;
    Ok(ApiRequest::control(Method::Get, path("sandboxes"))
        .query_opt("maxResults", input.max_results)
        .query_opt("nextToken", input.next_token.as_deref())
        .query_opt("status", status)
        .query_opt("templateName", input.template_name.as_deref())
        .query_opt("templateType", input.template_type))
}

pub(crate) fn access_token(sandbox_id: &str) -> Result<ApiRequest> {
    validate_id(ResourceKind::Sandbox, sandbox_id)?;
    Ok(ApiRequest::control(Method::Post, path("accessToken"))
        .resource(ResourceKind::Sandbox, sandbox_id)
        .json(json!({ "resourceId": sandbox_id, "resourceType": "sandbox" })))
}
