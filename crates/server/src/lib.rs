//! HTTP API server for the layergroup service.
//!
//! This crate provides the HTTP control plane:
//! - Layergroup creation and token-addressed configuration cache
//! - Feature attribute lookups (JSON and JSONP)
//! - Named template management and instantiation
//! - Health and Prometheus metrics endpoints

pub mod attributes;
pub mod auth;
pub mod bootstrap;
pub mod cache;
pub mod error;
pub mod handlers;
pub mod instantiate;
pub mod jsonp;
pub mod metrics;
pub mod routes;
pub mod state;

pub use attributes::{AttributesError, AttributesResolver};
pub use auth::{ApiKey, ApiKeySource, TraceId};
pub use cache::{CacheError, ConfigCache, CreatedLayergroup};
pub use error::ApiError;
pub use instantiate::{InstantiateError, TemplateInstantiator};
pub use routes::create_router;
pub use state::AppState;
