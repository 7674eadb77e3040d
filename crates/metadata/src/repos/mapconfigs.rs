//! Layergroup cache repository trait.

use crate::error::MetadataResult;
use crate::models::MapConfigRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for cached configurations.
#[async_trait]
pub trait MapConfigRepo: Send + Sync {
    /// Insert a configuration unless its token already exists.
    /// Returns true if this call created the row.
    async fn insert_map_config(&self, row: &MapConfigRow) -> MetadataResult<bool>;

    /// Get a configuration by token.
    async fn get_map_config(&self, token: &str) -> MetadataResult<Option<MapConfigRow>>;

    /// Delete configurations created before `cutoff`. Returns rows deleted.
    async fn purge_map_configs_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64>;

    /// Count cached configurations.
    async fn count_map_configs(&self) -> MetadataResult<u64>;
}
