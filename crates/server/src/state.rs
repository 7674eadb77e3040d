//! Application state shared across handlers.

use crate::attributes::AttributesResolver;
use crate::cache::ConfigCache;
use crate::instantiate::TemplateInstantiator;
use layergroup_core::config::AppConfig;
use layergroup_metadata::MetadataStore;
use layergroup_query::QueryExecutor;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store (cached configurations and templates).
    pub metadata: Arc<dyn MetadataStore>,
    /// Read-only layer data access.
    pub executor: Arc<dyn QueryExecutor>,
    /// Token-addressed configuration cache.
    pub cache: Arc<ConfigCache>,
    /// Feature attribute lookups.
    pub attributes: Arc<AttributesResolver>,
    /// Named template instantiation.
    pub instantiator: Arc<TemplateInstantiator>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        let cache = Arc::new(ConfigCache::new(metadata.clone(), executor.clone()));
        let attributes = Arc::new(AttributesResolver::new(cache.clone(), executor.clone()));
        let instantiator = Arc::new(TemplateInstantiator::new(metadata.clone(), cache.clone()));

        Self {
            config: Arc::new(config),
            metadata,
            executor,
            cache,
            attributes,
            instantiator,
        }
    }

    /// Owner scope for named templates.
    pub fn owner(&self) -> &str {
        &self.config.server.user
    }

    /// Spawn the cache TTL sweeper when a TTL is configured.
    pub fn spawn_cache_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        let ttl = Duration::from_secs(self.config.cache.ttl_secs?);
        let interval = Duration::from_secs(self.config.cache.sweep_interval_secs);
        let cache = self.cache.clone();

        Some(tokio::spawn(async move {
            tracing::info!(
                ttl_secs = ttl.as_secs(),
                interval_secs = interval.as_secs(),
                "Cache TTL sweeper enabled"
            );
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = cache.purge_older_than(ttl).await {
                    tracing::error!(error = %e, "Failed to purge expired layergroups");
                }
            }
        }))
    }
}
