//! Instrumented store and executor doubles.

use async_trait::async_trait;
use layergroup_metadata::{MapConfigRepo, MapConfigRow, MetadataResult};
use layergroup_query::{FeatureQuery, QueryError, QueryExecutor, QueryResult, Row};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

/// Delegates to an inner repo and counts insert attempts.
#[allow(dead_code)]
pub struct CountingRepo {
    inner: Arc<dyn MapConfigRepo>,
    pub inserts: AtomicUsize,
}

#[allow(dead_code)]
impl CountingRepo {
    pub fn new(inner: Arc<dyn MapConfigRepo>) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MapConfigRepo for CountingRepo {
    async fn insert_map_config(&self, row: &MapConfigRow) -> MetadataResult<bool> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_map_config(row).await
    }

    async fn get_map_config(&self, token: &str) -> MetadataResult<Option<MapConfigRow>> {
        self.inner.get_map_config(token).await
    }

    async fn purge_map_configs_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64> {
        self.inner.purge_map_configs_before(cutoff).await
    }

    async fn count_map_configs(&self) -> MetadataResult<u64> {
        self.inner.count_map_configs().await
    }
}

/// Executor whose attribute checks take `delay` and are counted.
#[allow(dead_code)]
pub struct SlowCheckExecutor {
    delay: Duration,
    pub checks: AtomicUsize,
}

#[allow(dead_code)]
impl SlowCheckExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            checks: AtomicUsize::new(0),
        }
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for SlowCheckExecutor {
    async fn query(&self, _sql: &str) -> QueryResult<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn fetch_feature(&self, _query: &FeatureQuery<'_>) -> QueryResult<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn check_columns(
        &self,
        _sql: &str,
        _id_column: &str,
        _columns: &[String],
    ) -> QueryResult<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn health_check(&self) -> QueryResult<()> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Executor whose backend is unreachable.
#[allow(dead_code)]
pub struct UnreachableExecutor;

#[async_trait]
impl QueryExecutor for UnreachableExecutor {
    async fn query(&self, _sql: &str) -> QueryResult<Vec<Row>> {
        Err(unreachable_error())
    }

    async fn fetch_feature(&self, _query: &FeatureQuery<'_>) -> QueryResult<Vec<Row>> {
        Err(unreachable_error())
    }

    async fn check_columns(
        &self,
        _sql: &str,
        _id_column: &str,
        _columns: &[String],
    ) -> QueryResult<()> {
        Err(unreachable_error())
    }

    async fn health_check(&self) -> QueryResult<()> {
        Err(unreachable_error())
    }

    async fn close(&self) {}
}

fn unreachable_error() -> QueryError {
    QueryError::Connection("connection refused".to_string())
}
