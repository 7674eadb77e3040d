//! Named template endpoints.
//!
//! Management (create, list, read, update, delete) requires a master key.
//! Instantiation is open to anyone the template's own auth admits.

use crate::auth::ApiKey;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{parse_json_body, parse_json_object};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use layergroup_core::NamedTemplate;
use layergroup_metadata::{TemplateRepo, TemplateRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Body field carrying the API key, stripped before a template is stored.
const API_KEY_FIELD: &str = "api_key";

#[derive(Debug, Serialize)]
pub struct TemplateIdResponse {
    pub template_id: String,
}

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub template_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub template: NamedTemplate,
}

#[derive(Debug, Serialize)]
pub struct InstantiateResponse {
    pub layergroupid: String,
    /// RFC 3339 modification time of the template.
    pub last_updated: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstantiateQuery {
    pub auth_token: Option<String>,
}

fn template_not_found(owner: &str, name: &str) -> ApiError {
    ApiError::NotFound(format!("Template '{name}' of user '{owner}' not found"))
}

/// Decode a template body after checking the caller's key.
///
/// The key is checked before a parse error is reported; a body that does not
/// parse contributes no key.
fn authorized_template(state: &AppState, api_key: ApiKey, body: &Bytes) -> ApiResult<NamedTemplate> {
    let parsed = parse_json_body(body);
    let api_key = match &parsed {
        Ok(value) => api_key.with_body(value),
        Err(_) => api_key,
    };
    api_key.require_master(&state.config)?;

    let mut value = parsed?;

    if let Value::Object(map) = &mut value {
        map.remove(API_KEY_FIELD);
    }
    let template = NamedTemplate::from_value(value)?;
    template.validate()?;
    Ok(template)
}

fn template_row(state: &AppState, template: &NamedTemplate) -> ApiResult<TemplateRow> {
    let now = OffsetDateTime::now_utc();
    Ok(TemplateRow {
        owner: state.owner().to_string(),
        name: template.name.clone(),
        template_json: serde_json::to_string(template)
            .map_err(|e| ApiError::Internal(format!("failed to encode template: {e}")))?,
        created_at: now,
        updated_at: now,
    })
}

/// POST /map/named - Create or replace a template.
pub async fn create_template(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    body: Bytes,
) -> ApiResult<Json<TemplateIdResponse>> {
    let template = authorized_template(&state, api_key, &body)?;
    let created = state
        .metadata
        .put_template(&template_row(&state, &template)?)
        .await?;

    tracing::info!(template = %template.name, created, "Template stored");
    Ok(Json(TemplateIdResponse {
        template_id: template.name,
    }))
}

/// GET /map/named - List template names.
pub async fn list_templates(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
) -> ApiResult<Json<TemplateListResponse>> {
    api_key.require_master(&state.config)?;

    let rows = state.metadata.list_templates(state.owner()).await?;
    Ok(Json(TemplateListResponse {
        template_ids: rows.into_iter().map(|row| row.name).collect(),
    }))
}

/// GET /map/named/{name} - A template definition.
pub async fn get_template(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    Path(name): Path<String>,
) -> ApiResult<Json<TemplateResponse>> {
    api_key.require_master(&state.config)?;

    let row = state
        .metadata
        .get_template(state.owner(), &name)
        .await?
        .ok_or_else(|| template_not_found(state.owner(), &name))?;
    let template = NamedTemplate::from_slice(row.template_json.as_bytes())?;

    Ok(Json(TemplateResponse { template }))
}

/// PUT /map/named/{name} - Replace an existing template.
pub async fn update_template(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<TemplateIdResponse>> {
    let template = authorized_template(&state, api_key, &body)?;
    if template.name != name {
        return Err(ApiError::BadRequest(format!(
            "Cannot update template name: '{}' does not match '{name}'",
            template.name
        )));
    }

    let updated = state
        .metadata
        .update_template(&template_row(&state, &template)?)
        .await?;
    if !updated {
        return Err(template_not_found(state.owner(), &name));
    }

    tracing::info!(template = %name, "Template updated");
    Ok(Json(TemplateIdResponse { template_id: name }))
}

/// DELETE /map/named/{name} - Remove a template.
pub async fn delete_template(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    api_key.require_master(&state.config)?;

    if !state.metadata.delete_template(state.owner(), &name).await? {
        return Err(template_not_found(state.owner(), &name));
    }

    tracing::info!(template = %name, "Template deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /map/named/{name} - Instantiate a template with placeholder values.
pub async fn instantiate_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<InstantiateQuery>,
    body: Bytes,
) -> ApiResult<Json<InstantiateResponse>> {
    let params = parse_json_object(&body)?;
    let instantiated = state
        .instantiator
        .instantiate(state.owner(), &name, &params, query.auth_token.as_deref())
        .await?;

    let last_updated = instantiated
        .last_updated
        .format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))?;

    Ok(Json(InstantiateResponse {
        layergroupid: instantiated.layergroup.token.to_string(),
        last_updated,
    }))
}
