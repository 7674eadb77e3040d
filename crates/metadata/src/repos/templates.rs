//! Named template repository trait.

use crate::error::MetadataResult;
use crate::models::TemplateRow;
use async_trait::async_trait;

/// Repository for named templates, scoped by owner.
#[async_trait]
pub trait TemplateRepo: Send + Sync {
    /// Create or replace a template. Last writer wins.
    /// Returns true if the template did not exist before.
    async fn put_template(&self, row: &TemplateRow) -> MetadataResult<bool>;

    /// Replace an existing template's definition in one conditional write.
    /// Returns false, leaving the store untouched, if no such template exists.
    async fn update_template(&self, row: &TemplateRow) -> MetadataResult<bool>;

    /// Get a template by owner and name.
    async fn get_template(&self, owner: &str, name: &str) -> MetadataResult<Option<TemplateRow>>;

    /// Delete a template. Returns true if a row was removed.
    async fn delete_template(&self, owner: &str, name: &str) -> MetadataResult<bool>;

    /// List an owner's templates ordered by name.
    async fn list_templates(&self, owner: &str) -> MetadataResult<Vec<TemplateRow>>;
}
