//! Named template instantiation.

use crate::cache::{CacheError, ConfigCache, CreatedLayergroup};
use crate::metrics;
use layergroup_core::{MapConfig, NamedTemplate, TemplateError};
use layergroup_metadata::{MetadataError, TemplateRepo};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

/// Instantiation errors.
#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("Template '{name}' of user '{owner}' not found")]
    NotFound { owner: String, name: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Config(#[from] layergroup_core::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// A configuration produced from a template.
#[derive(Clone, Debug)]
pub struct Instantiated {
    pub layergroup: CreatedLayergroup,
    /// Last modification time of the template.
    pub last_updated: OffsetDateTime,
}

/// Turns stored templates plus parameters into cached configurations.
pub struct TemplateInstantiator {
    templates: Arc<dyn TemplateRepo>,
    cache: Arc<ConfigCache>,
}

impl TemplateInstantiator {
    pub fn new(templates: Arc<dyn TemplateRepo>, cache: Arc<ConfigCache>) -> Self {
        Self { templates, cache }
    }

    /// Load, authorize, render and submit a template.
    pub async fn instantiate(
        &self,
        owner: &str,
        name: &str,
        params: &Map<String, Value>,
        auth_token: Option<&str>,
    ) -> Result<Instantiated, InstantiateError> {
        let row = self
            .templates
            .get_template(owner, name)
            .await?
            .ok_or_else(|| InstantiateError::NotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            })?;

        let template = NamedTemplate::from_slice(row.template_json.as_bytes())?;
        if let Err(e) = template.auth.authorize(auth_token) {
            tracing::debug!(template = %name, "Template instantiation refused");
            return Err(e.into());
        }

        let rendered = template.render(params)?;
        let config = MapConfig::from_value(rendered)?;
        let layergroup = self.cache.create(&config).await?;

        metrics::TEMPLATE_INSTANTIATIONS.inc();
        tracing::info!(
            template = %name,
            token = %layergroup.token,
            "Template instantiated"
        );

        Ok(Instantiated {
            layergroup,
            last_updated: row.updated_at,
        })
    }
}
