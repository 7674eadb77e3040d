//! API error types.

use crate::attributes::AttributesError;
use crate::cache::CacheError;
use crate::instantiate::InstantiateError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use layergroup_core::{LayerRef, TemplateError, ValidationError};
use layergroup_metadata::MetadataError;
use layergroup_query::QueryError;
use serde::Serialize;

/// Message returned in place of server-side failure details.
const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error envelope returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable messages.
    pub errors: Vec<String>,
    /// The same messages with their origin.
    pub errors_with_context: Vec<ErrorContext>,
}

/// One error with its origin.
#[derive(Debug, Serialize)]
pub struct ErrorContext {
    /// `layer` for layer-scoped validation errors, `unknown` otherwise.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerRef>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Attributes(#[from] AttributesError),

    #[error(transparent)]
    Instantiate(#[from] InstantiateError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Core(#[from] layergroup_core::Error),
}

impl ApiError {
    /// Get the error code for this error, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal_error",
            Self::Validation(_) => "validation_error",
            Self::Template(_) => "template_error",
            Self::Cache(_) => "cache_error",
            Self::Attributes(_) => "attributes_error",
            Self::Instantiate(_) => "instantiate_error",
            Self::Query(_) => "query_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Template(e) => template_status(e),
            Self::Cache(e) => cache_status(e),
            Self::Attributes(e) => attributes_status(e),
            Self::Instantiate(e) => match e {
                InstantiateError::NotFound { .. } => StatusCode::NOT_FOUND,
                InstantiateError::Template(e) => template_status(e),
                InstantiateError::Config(e) => core_status(e),
                InstantiateError::Cache(e) => cache_status(e),
                InstantiateError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Query(e) => query_status(e),
            Self::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(e) => core_status(e),
        }
    }

    /// The layer a validation error refers to, wherever it is nested.
    fn layer(&self) -> Option<&LayerRef> {
        let validation = match self {
            Self::Validation(e) => e,
            Self::Cache(CacheError::Validation(e)) => e,
            Self::Attributes(AttributesError::Cache(CacheError::Validation(e))) => e,
            Self::Instantiate(InstantiateError::Cache(CacheError::Validation(e))) => e,
            _ => return None,
        };
        Some(&validation.layer)
    }

    /// Message shown to clients. Server-side failures are not disclosed.
    fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
                INTERNAL_MESSAGE.to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Build the client-facing envelope.
    pub fn body(&self) -> ErrorResponse {
        let message = self.public_message();
        let layer = self.layer().cloned();
        ErrorResponse {
            errors: vec![message.clone()],
            errors_with_context: vec![ErrorContext {
                kind: if layer.is_some() { "layer" } else { "unknown" },
                message,
                layer,
            }],
        }
    }

    /// Log server-side failures before they are hidden from the client.
    pub(crate) fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), status = %status, error = %self, "Request rejected");
        }
    }
}

fn template_status(e: &TemplateError) -> StatusCode {
    match e {
        TemplateError::Unauthorized => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn cache_status(e: &CacheError) -> StatusCode {
    match e {
        CacheError::Validation(_) => StatusCode::BAD_REQUEST,
        CacheError::Config(e) => core_status(e),
        CacheError::NotFound(_) => StatusCode::NOT_FOUND,
        CacheError::Query(e) => query_status(e),
        CacheError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn attributes_status(e: &AttributesError) -> StatusCode {
    match e {
        AttributesError::Cache(e) => cache_status(e),
        AttributesError::LayerNotFound(_) => StatusCode::NOT_FOUND,
        AttributesError::NoExposedAttributes { .. } => StatusCode::BAD_REQUEST,
        AttributesError::FeatureNotFound { .. } => StatusCode::NOT_FOUND,
        AttributesError::AmbiguousFeature { .. } => StatusCode::NOT_FOUND,
        AttributesError::Query(e) => query_status(e),
    }
}

fn query_status(e: &QueryError) -> StatusCode {
    match e {
        QueryError::ReadOnlyViolation(_) => StatusCode::BAD_REQUEST,
        QueryError::MultipleStatements => StatusCode::BAD_REQUEST,
        QueryError::UndefinedObject(_) => StatusCode::NOT_FOUND,
        QueryError::Execution(_) => StatusCode::BAD_REQUEST,
        QueryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        QueryError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        QueryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn core_status(e: &layergroup_core::Error) -> StatusCode {
    match e {
        layergroup_core::Error::InvalidToken(_) => StatusCode::NOT_FOUND,
        layergroup_core::Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_error() -> ValidationError {
        ValidationError {
            layer: LayerRef {
                id: "layer1".to_string(),
                index: 1,
                layer_type: "mapnik".to_string(),
            },
            message: "Invalid resolution, should be a number greater than 0".to_string(),
        }
    }

    #[test]
    fn test_validation_envelope_names_layer() {
        let err = ApiError::from(CacheError::Validation(validation_error()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(
            body["errors"][0],
            "Invalid resolution, should be a number greater than 0"
        );
        assert_eq!(body["errors_with_context"][0]["type"], "layer");
        assert_eq!(body["errors_with_context"][0]["layer"]["index"], 1);
        assert_eq!(body["errors_with_context"][0]["layer"]["type"], "mapnik");
    }

    #[test]
    fn test_other_errors_have_unknown_context() {
        let err = ApiError::NotFound("Layer 4 not found".to_string());
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["errors_with_context"][0]["type"], "unknown");
        assert!(body["errors_with_context"][0].get("layer").is_none());
    }

    #[test]
    fn test_query_error_statuses() {
        let read_only = ApiError::from(QueryError::ReadOnlyViolation(
            "cannot execute INSERT in a read-only transaction".to_string(),
        ));
        assert_eq!(read_only.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_only.body().errors[0],
            "cannot execute INSERT in a read-only transaction"
        );

        let timeout = ApiError::from(QueryError::Timeout(500));
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.body().errors[0], "query timed out after 500ms");

        let undefined = ApiError::from(QueryError::UndefinedObject(
            "column \"x\" does not exist".to_string(),
        ));
        assert_eq!(undefined.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ApiError::from(MetadataError::Config("disk on fire".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body().errors[0], INTERNAL_MESSAGE);
    }

    #[test]
    fn test_template_statuses() {
        assert_eq!(
            ApiError::from(TemplateError::Unauthorized).status_code(),
            StatusCode::FORBIDDEN
        );
        let missing = ApiError::from(TemplateError::MissingPlaceholder {
            name: "color".to_string(),
        });
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            missing.body().errors[0],
            "Missing value for placeholder 'color'"
        );
    }
}
