//! JSONP response wrapping.
//!
//! With a `callback` query parameter the JSON payload is wrapped in a guarded
//! function call and the status is always 200, so browsers still run the
//! callback for errors.

use crate::error::{ApiError, ApiResult};
use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

const JAVASCRIPT_CONTENT_TYPE: &str = "text/javascript; charset=utf-8";

/// Query parameters accepted by JSONP-capable endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct JsonpQuery {
    pub callback: Option<String>,
}

impl JsonpQuery {
    /// The validated callback name, if one was supplied.
    pub fn callback(&self) -> ApiResult<Option<&str>> {
        match self.callback.as_deref() {
            None | Some("") => Ok(None),
            Some(name) if is_valid_callback(name) => Ok(Some(name)),
            Some(name) => Err(ApiError::BadRequest(format!(
                "Invalid callback name '{name}'"
            ))),
        }
    }
}

/// Callback names are JavaScript identifiers, optionally dotted.
fn is_valid_callback(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
}

/// Render a handler result as plain JSON or, with a callback, as JSONP.
pub fn respond<T: Serialize>(query: &JsonpQuery, result: ApiResult<T>) -> Response {
    let callback = match query.callback() {
        Ok(callback) => callback,
        Err(e) => return e.into_response(),
    };

    match (callback, result) {
        (None, Ok(body)) => Json(body).into_response(),
        (None, Err(e)) => e.into_response(),
        (Some(callback), Ok(body)) => wrap(callback, &body),
        (Some(callback), Err(e)) => {
            e.log();
            wrap(callback, &e.body())
        }
    }
}

fn wrap<T: Serialize>(callback: &str, body: &T) -> Response {
    let json = match serde_json::to_string(body) {
        Ok(json) => json,
        Err(e) => return ApiError::Internal(e.to_string()).into_response(),
    };
    let script = format!("/**/ typeof {callback} === 'function' && {callback}({json});");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JAVASCRIPT_CONTENT_TYPE)],
        script,
    )
        .into_response()
}
