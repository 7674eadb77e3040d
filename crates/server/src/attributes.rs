//! Feature attribute lookup for cached configurations.

use crate::cache::{CacheError, ConfigCache};
use crate::metrics;
use layergroup_query::{FeatureId, FeatureQuery, QueryError, QueryExecutor, Row};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Attribute lookup errors.
#[derive(Debug, Error)]
pub enum AttributesError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Layer {0} not found")]
    LayerNotFound(usize),

    #[error("Layer {layer_index} has no exposed attributes")]
    NoExposedAttributes { layer_index: usize },

    // Zero matches share the cardinality message with duplicates.
    #[error(
        "Multiple features (0) identified by '{id_column}' = {feature_id} in layer {layer_index}"
    )]
    FeatureNotFound {
        id_column: String,
        feature_id: FeatureId,
        layer_index: usize,
    },

    #[error(
        "Multiple features ({count}) identified by '{id_column}' = {feature_id} in layer {layer_index}"
    )]
    AmbiguousFeature {
        count: usize,
        id_column: String,
        feature_id: FeatureId,
        layer_index: usize,
    },

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl AttributesError {
    /// Label used for the lookup outcome metric.
    fn outcome(&self) -> &'static str {
        match self {
            Self::Cache(_) | Self::LayerNotFound(_) => "not_found",
            Self::NoExposedAttributes { .. } => "no_attributes",
            Self::FeatureNotFound { .. } => "feature_not_found",
            Self::AmbiguousFeature { .. } => "ambiguous",
            Self::Query(_) => "query_error",
        }
    }
}

/// Resolves token + layer + feature id to one attribute row.
pub struct AttributesResolver {
    cache: Arc<ConfigCache>,
    executor: Arc<dyn QueryExecutor>,
}

impl AttributesResolver {
    pub fn new(cache: Arc<ConfigCache>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { cache, executor }
    }

    /// Return the exposed columns of the single feature whose id column
    /// equals `feature_id`.
    pub async fn resolve(
        &self,
        token: &str,
        layer_index: usize,
        feature_id: &str,
    ) -> Result<Row, AttributesError> {
        let result = self.lookup(token, layer_index, feature_id).await;
        match &result {
            Ok(_) => metrics::record_attribute_lookup("found"),
            Err(e) => metrics::record_attribute_lookup(e.outcome()),
        }
        result
    }

    async fn lookup(
        &self,
        token: &str,
        layer_index: usize,
        feature_id: &str,
    ) -> Result<Row, AttributesError> {
        let config = self.cache.get(token).await?;
        let layer = config
            .layer(layer_index)
            .ok_or(AttributesError::LayerNotFound(layer_index))?;

        let spec = layer
            .options
            .attributes()
            .ok_or(AttributesError::NoExposedAttributes { layer_index })?;
        let sql = layer
            .options
            .sql
            .as_deref()
            .ok_or(AttributesError::NoExposedAttributes { layer_index })?;

        let feature_id = FeatureId::parse(feature_id);
        let query = FeatureQuery {
            sql,
            id_column: &spec.id_column,
            columns: &spec.columns,
            feature_id: &feature_id,
        };

        let started = Instant::now();
        let rows = self.executor.fetch_feature(&query).await;
        metrics::QUERY_DURATION.observe(started.elapsed().as_secs_f64());
        let mut rows = rows?;

        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(AttributesError::FeatureNotFound {
                id_column: spec.id_column.clone(),
                feature_id,
                layer_index,
            }),
            count => {
                tracing::debug!(
                    token = %token,
                    layer = layer_index,
                    count,
                    "Feature id matches several rows"
                );
                Err(AttributesError::AmbiguousFeature {
                    count,
                    id_column: spec.id_column.clone(),
                    feature_id,
                    layer_index,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_messages() {
        let ambiguous = AttributesError::AmbiguousFeature {
            count: 2,
            id_column: "i".to_string(),
            feature_id: FeatureId::Int(2),
            layer_index: 0,
        };
        assert_eq!(
            ambiguous.to_string(),
            "Multiple features (2) identified by 'i' = 2 in layer 0"
        );

        let missing = AttributesError::FeatureNotFound {
            id_column: "i".to_string(),
            feature_id: FeatureId::Text("x".to_string()),
            layer_index: 1,
        };
        assert_eq!(
            missing.to_string(),
            "Multiple features (0) identified by 'i' = x in layer 1"
        );
    }

    #[test]
    fn test_exposure_messages() {
        assert_eq!(
            AttributesError::NoExposedAttributes { layer_index: 0 }.to_string(),
            "Layer 0 has no exposed attributes"
        );
        assert_eq!(
            AttributesError::LayerNotFound(3).to_string(),
            "Layer 3 not found"
        );
    }
}
