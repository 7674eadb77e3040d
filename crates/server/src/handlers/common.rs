//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::body::Bytes;
use serde_json::{Map, Value};

/// Decode a JSON request body. An empty body decodes as an empty object.
pub fn parse_json_body(body: &Bytes) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Decode a JSON request body that must be an object.
pub fn parse_json_object(body: &Bytes) -> ApiResult<Map<String, Value>> {
    match parse_json_body(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}
