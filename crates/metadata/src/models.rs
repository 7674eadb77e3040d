//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;

/// A cached, validated configuration addressed by its token.
///
/// Rows are immutable once inserted.
#[derive(Debug, Clone, FromRow)]
pub struct MapConfigRow {
    /// Lowercase hex fingerprint of the canonical configuration.
    pub token: String,
    /// Canonical configuration JSON.
    pub config_json: String,
    pub layer_count: i64,
    pub created_at: OffsetDateTime,
}

/// A named template definition within an owner scope.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub owner: String,
    pub name: String,
    /// Template definition JSON.
    pub template_json: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
