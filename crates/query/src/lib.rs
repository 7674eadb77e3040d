//! Read-only query execution for layer data.
//!
//! This crate provides:
//! - The `QueryExecutor` trait used to look up feature attributes
//! - SQL builders that wrap layer queries as subqueries
//! - Backends: SQLite (`query_only`) and PostgreSQL (read-only transactions)

pub mod backends;
pub mod error;
pub mod sql;
pub mod traits;

pub use backends::{postgres::PostgresExecutor, sqlite::SqliteExecutor};
pub use error::{QueryError, QueryResult};
pub use traits::{FeatureId, FeatureQuery, QueryExecutor, Row};

use layergroup_core::config::{QueryBackendConfig, QueryConfig};
use std::sync::Arc;

/// Create a query executor from configuration.
pub async fn from_config(config: &QueryConfig) -> QueryResult<Arc<dyn QueryExecutor>> {
    config.validate().map_err(QueryError::Config)?;

    match &config.backend {
        QueryBackendConfig::Sqlite { path } => {
            let executor = SqliteExecutor::open(path, config.timeout()).await?;
            Ok(Arc::new(executor))
        }
        QueryBackendConfig::Postgres {
            url,
            max_connections,
        } => {
            let executor =
                PostgresExecutor::connect(url, *max_connections, config.timeout()).await?;
            Ok(Arc::new(executor))
        }
    }
}
