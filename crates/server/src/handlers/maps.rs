//! Layergroup creation, retrieval and attribute endpoints.

use crate::error::{ApiError, ApiResult};
use crate::jsonp::{self, JsonpQuery};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use layergroup_core::MapConfig;
use layergroup_query::Row;
use serde::Serialize;

/// Response for a created or reused layergroup.
#[derive(Debug, Serialize)]
pub struct LayergroupResponse {
    pub layergroupid: String,
    pub layercount: usize,
}

/// POST /map - Create (or reuse) a layergroup from a configuration.
pub async fn create_layergroup(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<LayergroupResponse>> {
    let config = MapConfig::from_slice(&body)?;
    let created = state.cache.create(&config).await?;

    Ok(Json(LayergroupResponse {
        layergroupid: created.token.to_string(),
        layercount: created.layer_count,
    }))
}

/// GET /map/{token} - The stored configuration.
pub async fn get_layergroup(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<JsonpQuery>,
) -> Response {
    let result = state.cache.get(&token).await.map_err(ApiError::from);
    jsonp::respond(&query, result)
}

/// GET /map/{token}/{layer}/attributes/{feature} - One feature's attributes.
pub async fn get_attributes(
    State(state): State<AppState>,
    Path((token, layer, feature)): Path<(String, String, String)>,
    Query(query): Query<JsonpQuery>,
) -> Response {
    jsonp::respond(&query, resolve_attributes(&state, &token, &layer, &feature).await)
}

async fn resolve_attributes(
    state: &AppState,
    token: &str,
    layer: &str,
    feature: &str,
) -> ApiResult<Row> {
    let layer_index: usize = layer
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid layer index '{layer}'")))?;
    Ok(state.attributes.resolve(token, layer_index, feature).await?)
}
