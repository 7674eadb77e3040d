//! Health endpoint.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub metadata: &'static str,
    pub query: &'static str,
}

fn component(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

/// GET /health - Metadata store and query executor connectivity.
///
/// Unauthenticated so load balancers and orchestrators can poll it.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let metadata = state.metadata.health_check().await;
    if let Err(e) = &metadata {
        tracing::warn!(error = %e, "Metadata store health check failed");
    }
    let query = state.executor.health_check().await;
    if let Err(e) = &query {
        tracing::warn!(error = %e, "Query executor health check failed");
    }

    let healthy = metadata.is_ok() && query.is_ok();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            metadata: component(metadata.is_ok()),
            query: component(query.is_ok()),
        }),
    )
}
