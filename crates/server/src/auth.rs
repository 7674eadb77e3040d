//! Credential resolution and request tracing middleware.
//!
//! A request's API key comes from the first of: an `Authorization: Basic`
//! header, the `api_key` query parameter, the `api_key` field of a JSON body,
//! or the configured default key. Only the header, query and default sources
//! are visible to the middleware; handlers that parse a JSON body call
//! [`ApiKey::with_body`] to apply the third source.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use layergroup_core::config::AppConfig;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Header carrying the request trace ID, in both directions.
const TRACE_ID_HEADER: &str = "x-trace-id";

/// Name of the query parameter and body field carrying an API key.
const API_KEY_PARAM: &str = "api_key";

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, keeping at most
    /// MAX_TRACE_ID_LEN printable ASCII characters.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a request's API key came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiKeySource {
    Header,
    Query,
    Body,
    Default,
}

/// The credential resolved for one request. Never persisted.
#[derive(Clone, Debug)]
pub struct ApiKey {
    /// Username from a Basic header.
    pub username: Option<String>,
    pub token: String,
    pub source: ApiKeySource,
}

impl ApiKey {
    /// Resolve the key from headers and query string, falling back to the
    /// configured default.
    pub fn resolve(headers: &HeaderMap, query: &HashMap<String, String>, default_key: &str) -> Self {
        if let Some(key) = Self::from_basic_header(headers) {
            return key;
        }
        if let Some(token) = query.get(API_KEY_PARAM).filter(|t| !t.is_empty()) {
            return Self {
                username: None,
                token: token.clone(),
                source: ApiKeySource::Query,
            };
        }
        Self {
            username: None,
            token: default_key.to_string(),
            source: ApiKeySource::Default,
        }
    }

    /// Apply a JSON body's `api_key` field. It only replaces the default key;
    /// header and query keys take precedence.
    pub fn with_body(self, body: &Value) -> Self {
        if self.source != ApiKeySource::Default {
            return self;
        }
        match body.get(API_KEY_PARAM).and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Self {
                username: None,
                token: token.to_string(),
                source: ApiKeySource::Body,
            },
            _ => self,
        }
    }

    fn from_basic_header(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        // RFC 7617: the scheme is case-insensitive
        if value.len() < 6 || !value[..6].eq_ignore_ascii_case("basic ") {
            return None;
        }
        let decoded = STANDARD.decode(value[6..].trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, token) = decoded.split_once(':')?;
        if token.is_empty() {
            return None;
        }
        Some(Self {
            username: (!username.is_empty()).then(|| username.to_string()),
            token: token.to_string(),
            source: ApiKeySource::Header,
        })
    }

    /// Require a master key for template management.
    ///
    /// The default key never qualifies. A Basic username must name the
    /// configured owner.
    pub fn require_master(&self, config: &AppConfig) -> ApiResult<()> {
        if self.source == ApiKeySource::Default {
            return Err(ApiError::Unauthorized(
                "Unauthorized: an API key is required".to_string(),
            ));
        }

        let hash = hash_key(&self.token);
        let known = config
            .auth
            .normalized_master_key_hashes()
            .iter()
            .any(|h| *h == hash);
        if !known {
            return Err(ApiError::Forbidden(
                "Forbidden: invalid API key".to_string(),
            ));
        }

        if let Some(username) = &self.username
            && *username != config.server.user
        {
            return Err(ApiError::Forbidden(format!(
                "Forbidden: user '{username}' cannot manage templates of '{}'",
                config.server.user
            )));
        }

        Ok(())
    }
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Lowercase hex SHA-256 of a key.
fn hash_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Middleware that resolves the request credential and sets up trace context.
///
/// The trace ID is echoed back in the `x-trace-id` response header.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);

    // A malformed query string resolves as if no api_key was given.
    let query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();
    let api_key = ApiKey::resolve(req.headers(), &query, &state.config.auth.default_api_key);
    tracing::trace!(source = ?api_key.source, "Resolved API key");
    req.extensions_mut().insert(api_key);

    let mut response = next
        .run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id))
        .await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}
