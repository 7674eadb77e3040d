//! Query executor trait definitions.

use crate::error::QueryResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// A result row as column name -> JSON value, in select-list order where the
/// map preserves order.
pub type Row = Map<String, Value>;

/// A feature identifier taken from a request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureId {
    /// Bound as a 64-bit integer.
    Int(i64),
    /// Bound as text.
    Text(String),
}

impl FeatureId {
    /// Integers bind as integers, anything else as text.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A lookup of one feature's exposed columns within a layer query.
#[derive(Clone, Copy, Debug)]
pub struct FeatureQuery<'a> {
    /// The layer's data query.
    pub sql: &'a str,
    /// Column identifying features.
    pub id_column: &'a str,
    /// Columns to return.
    pub columns: &'a [String],
    /// Requested feature.
    pub feature_id: &'a FeatureId,
}

/// Read-only access to layer data.
///
/// Implementations must guarantee that no statement can persist a write,
/// whatever SQL they are handed.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a statement and return every row.
    async fn query(&self, sql: &str) -> QueryResult<Vec<Row>>;

    /// Return every row of a layer query matching the feature id.
    async fn fetch_feature(&self, query: &FeatureQuery<'_>) -> QueryResult<Vec<Row>>;

    /// Check that the layer query runs and exposes `id_column` and `columns`.
    async fn check_columns(
        &self,
        sql: &str,
        id_column: &str,
        columns: &[String],
    ) -> QueryResult<()>;

    /// Check backend connectivity.
    async fn health_check(&self) -> QueryResult<()>;

    /// Close the underlying pool.
    async fn close(&self);
}
