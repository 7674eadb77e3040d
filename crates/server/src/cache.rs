//! Token-addressed cache of validated configurations.
//!
//! Submissions are validated, normalized and fingerprinted. The fingerprint
//! names the cache entry, so equivalent configurations share one token. Each
//! fingerprint is created at most once: concurrent submissions of the same
//! configuration wait on a single in-flight creation.

use crate::metrics;
use layergroup_core::normalize::normalize;
use layergroup_core::validation::{self, ValidationError};
use layergroup_core::{Fingerprint, LayergroupToken, MapConfig};
use layergroup_metadata::{MapConfigRepo, MapConfigRow, MetadataError};
use layergroup_query::{QueryError, QueryExecutor};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OnceCell};

/// Errors from creating or looking up cache entries.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] layergroup_core::Error),

    #[error("Invalid or nonexistent map configuration token '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Outcome of a cache submission.
#[derive(Clone, Debug)]
pub struct CreatedLayergroup {
    pub token: LayergroupToken,
    pub layer_count: usize,
    /// True only for the caller whose submission inserted the entry.
    pub created: bool,
}

/// Concurrency-safe map from token to validated configuration.
pub struct ConfigCache {
    repo: Arc<dyn MapConfigRepo>,
    executor: Arc<dyn QueryExecutor>,
    inflight: Mutex<HashMap<Fingerprint, Arc<OnceCell<CreatedLayergroup>>>>,
}

impl ConfigCache {
    pub fn new(repo: Arc<dyn MapConfigRepo>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            repo,
            executor,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, tokenize and store a configuration.
    pub async fn create(&self, config: &MapConfig) -> Result<CreatedLayergroup, CacheError> {
        if let Err(e) = validation::validate(config) {
            metrics::VALIDATION_FAILURES.inc();
            tracing::debug!(layer = e.layer.index, error = %e, "Configuration rejected");
            return Err(e.into());
        }

        let canonical = normalize(config)?;
        let config_json = serde_json::to_string(&canonical)
            .map_err(|e| layergroup_core::Error::Serialization(e.to_string()))?;
        let fingerprint = Fingerprint::compute(config_json.as_bytes());
        let token = LayergroupToken::from(fingerprint);

        if self.repo.get_map_config(token.as_str()).await?.is_some() {
            metrics::CACHE_HITS.inc();
            tracing::debug!(token = %token, "Configuration already cached");
            return Ok(CreatedLayergroup {
                token,
                layer_count: config.layer_count(),
                created: false,
            });
        }

        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(fingerprint)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let initialized_here = AtomicBool::new(false);
        let result = {
            let flag = &initialized_here;
            let token = &token;
            cell.get_or_try_init(|| async move {
                flag.store(true, Ordering::Relaxed);
                self.insert(config, token, config_json).await
            })
            .await
            .cloned()
        };

        {
            let mut inflight = self.inflight.lock().await;
            if inflight
                .get(&fingerprint)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                inflight.remove(&fingerprint);
            }
        }

        let mut outcome = result?;
        if !initialized_here.load(Ordering::Relaxed) {
            metrics::COALESCED_CREATES.inc();
            outcome.created = false;
        }
        Ok(outcome)
    }

    /// Verify exposed attributes and insert the entry. Runs once per
    /// in-flight fingerprint.
    async fn insert(
        &self,
        config: &MapConfig,
        token: &LayergroupToken,
        config_json: String,
    ) -> Result<CreatedLayergroup, CacheError> {
        // A creation that finished after our fast-path miss already stored it.
        if self.repo.get_map_config(token.as_str()).await?.is_some() {
            return Ok(CreatedLayergroup {
                token: token.clone(),
                layer_count: config.layer_count(),
                created: false,
            });
        }

        self.verify_attributes(config).await?;

        let row = MapConfigRow {
            token: token.to_string(),
            config_json,
            layer_count: config.layer_count() as i64,
            created_at: OffsetDateTime::now_utc(),
        };
        let created = self.repo.insert_map_config(&row).await?;
        if created {
            metrics::LAYERGROUPS_CREATED.inc();
            tracing::info!(token = %token, layers = config.layer_count(), "Layergroup created");
        }

        Ok(CreatedLayergroup {
            token: token.clone(),
            layer_count: config.layer_count(),
            created,
        })
    }

    /// Check every layer that exposes attributes so unknown columns and
    /// write attempts are reported at creation time.
    async fn verify_attributes(&self, config: &MapConfig) -> Result<(), CacheError> {
        for (index, layer) in config.layers.iter().enumerate() {
            let (Some(spec), Some(sql)) = (layer.options.attributes(), layer.options.sql.as_deref())
            else {
                continue;
            };

            let started = Instant::now();
            let result = self
                .executor
                .check_columns(sql, &spec.id_column, &spec.columns)
                .await;
            metrics::QUERY_DURATION.observe(started.elapsed().as_secs_f64());

            if let Err(e) = result {
                tracing::debug!(layer = index, error = %e, "Attribute check failed");
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Look up a configuration by token.
    pub async fn get(&self, token: &str) -> Result<MapConfig, CacheError> {
        let not_found = || CacheError::NotFound(token.to_string());
        let token = LayergroupToken::parse(token).map_err(|_| not_found())?;

        let row = self
            .repo
            .get_map_config(token.as_str())
            .await?
            .ok_or_else(not_found)?;

        Ok(MapConfig::from_slice(row.config_json.as_bytes())?)
    }

    /// Remove entries created more than `ttl` ago.
    pub async fn purge_older_than(&self, ttl: Duration) -> Result<u64, CacheError> {
        let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
        let cutoff = OffsetDateTime::now_utc()
            .checked_sub(ttl)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let purged = self.repo.purge_map_configs_before(cutoff).await?;
        if purged > 0 {
            metrics::CACHE_ENTRIES_PURGED.inc_by(purged);
            tracing::info!(purged, "Expired layergroups purged");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use layergroup_metadata::SqliteStore;
    use layergroup_query::{FeatureQuery, QueryResult, Row};
    use serde_json::json;

    struct NoopExecutor;

    #[async_trait]
    impl QueryExecutor for NoopExecutor {
        async fn query(&self, _sql: &str) -> QueryResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn fetch_feature(&self, _query: &FeatureQuery<'_>) -> QueryResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn check_columns(
            &self,
            _sql: &str,
            id_column: &str,
            _columns: &[String],
        ) -> QueryResult<()> {
            if id_column == "missing" {
                return Err(QueryError::UndefinedObject(
                    "column \"missing\" does not exist".to_string(),
                ));
            }
            Ok(())
        }

        async fn health_check(&self) -> QueryResult<()> {
            Ok(())
        }

        async fn close(&self) {}
    }

    async fn cache() -> (tempfile::TempDir, ConfigCache) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("metadata.db")).await.unwrap();
        let cache = ConfigCache::new(Arc::new(store), Arc::new(NoopExecutor));
        (dir, cache)
    }

    fn config(value: serde_json::Value) -> MapConfig {
        MapConfig::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (_dir, cache) = cache().await;
        let a = config(json!({ "layers": [{ "options": { "sql": "select 1", "cartocss": "#l{}" } }] }));
        let b = config(json!({ "layers": [{ "options": { "cartocss": "#l{}", "sql": " select 1 " } }] }));

        let first = cache.create(&a).await.unwrap();
        let second = cache.create(&b).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.token, second.token);
        assert_eq!(first.layer_count, 1);
    }

    #[tokio::test]
    async fn test_get_returns_normalized_config() {
        let (_dir, cache) = cache().await;
        let created = cache
            .create(&config(json!({ "layers": [{ "options": { "sql": " select 1 " } }] })))
            .await
            .unwrap();

        let stored = cache.get(created.token.as_str()).await.unwrap();
        assert_eq!(stored.layers[0].options.sql.as_deref(), Some("select 1"));
        assert_eq!(stored.layers[0].layer_type, "mapnik");
    }

    #[tokio::test]
    async fn test_get_unknown_or_malformed_token() {
        let (_dir, cache) = cache().await;
        assert!(matches!(
            cache.get(&"0".repeat(64)).await,
            Err(CacheError::NotFound(_))
        ));
        assert!(matches!(
            cache.get("not-a-token").await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_error_is_not_cached() {
        let (_dir, cache) = cache().await;
        let invalid = config(json!({
            "layers": [{ "options": { "sql": "select 1", "aggregation": { "placement": "nope" } } }]
        }));
        match cache.create(&invalid).await {
            Err(CacheError::Validation(e)) => assert_eq!(e.layer.index, 0),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(cache.repo.count_map_configs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attribute_check_failure_blocks_creation() {
        let (_dir, cache) = cache().await;
        let bad = config(json!({
            "layers": [{ "options": { "sql": "select 1", "attributes": { "id": "missing", "columns": ["n"] } } }]
        }));
        assert!(matches!(
            cache.create(&bad).await,
            Err(CacheError::Query(QueryError::UndefinedObject(_)))
        ));
        assert_eq!(cache.repo.count_map_configs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let (_dir, cache) = cache().await;
        cache
            .create(&config(json!({ "layers": [{ "options": { "sql": "select 1" } }] })))
            .await
            .unwrap();

        assert_eq!(cache.purge_older_than(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(cache.purge_older_than(Duration::ZERO).await.unwrap(), 1);
    }
}
