//! Startup template seeding.

use anyhow::{Context, Result, bail};
use layergroup_core::NamedTemplate;
use layergroup_metadata::{MetadataStore, TemplateRepo, TemplateRow};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Store every `*.json` template found in `dir` under `owner`.
///
/// Files are loaded in name order and an invalid file aborts seeding.
/// Returns the number of templates stored.
pub async fn seed_templates(metadata: &dyn MetadataStore, owner: &str, dir: &Path) -> Result<usize> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read templates directory: {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read template: {}", path.display()))?;
        let template = NamedTemplate::from_slice(&bytes)
            .with_context(|| format!("failed to parse template: {}", path.display()))?;
        if let Err(e) = template.validate() {
            bail!("invalid template {}: {e}", path.display());
        }

        let now = OffsetDateTime::now_utc();
        let row = TemplateRow {
            owner: owner.to_string(),
            name: template.name.clone(),
            template_json: serde_json::to_string(&template)?,
            created_at: now,
            updated_at: now,
        };
        let created = metadata.put_template(&row).await?;
        tracing::info!(
            template = %template.name,
            path = %path.display(),
            created,
            "Seeded template"
        );
    }

    Ok(paths.len())
}
