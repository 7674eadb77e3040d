//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, header};
use axum::middleware;
use axum::routing::{get, post};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Headers browsers may send on cross-origin requests.
const CORS_ALLOW_HEADERS: &str = "X-Requested-With, X-Prototype-Version, X-CSRF-Token, Authorization";

/// Layergroup and named template routes, mounted under several prefixes.
fn map_routes() -> Router<AppState> {
    Router::new()
        .route("/map", post(handlers::create_layergroup))
        .route(
            "/map/named",
            post(handlers::create_template).get(handlers::list_templates),
        )
        .route(
            "/map/named/{name}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .post(handlers::instantiate_template)
                .delete(handlers::delete_template),
        )
        .route("/map/{token}", get(handlers::get_layergroup))
        .route(
            "/map/{token}/{layer}/attributes/{feature}",
            get(handlers::get_attributes),
        )
}

fn cors_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", map_routes())
        .merge(map_routes())
        // Health check (unauthenticated for load balancers and k8s health checks)
        .route("/health", get(handlers::health_check));

    // The metrics endpoint must be network-restricted to scrapers when enabled.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let body_limit = state.config.server.max_body_size;

    // Layers run outermost first: TraceLayer -> CORS headers -> body limit -> auth -> handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .layer(cors_header(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            CORS_ALLOW_HEADERS,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
