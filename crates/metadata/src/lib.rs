//! Metadata store abstraction and implementations for the layergroup service.
//!
//! This crate persists:
//! - Cached configurations keyed by layergroup token
//! - Named templates per owner scope

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{MapConfigRow, TemplateRow};
pub use postgres::PostgresStore;
pub use repos::{MapConfigRepo, TemplateRepo};
pub use store::{MetadataStore, SqliteStore};

use layergroup_core::config::MetadataConfig;
use std::sync::Arc;

/// Open the metadata store selected by `config`.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store: Arc<dyn MetadataStore> = match config {
        MetadataConfig::Sqlite { path } => Arc::new(SqliteStore::new(path).await?),
        MetadataConfig::Postgres { .. } => Arc::new(PostgresStore::from_config(config).await?),
    };
    Ok(store)
}
