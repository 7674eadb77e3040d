//! Metadata store trait and the SQLite implementation.

use crate::error::MetadataResult;
use crate::repos::{MapConfigRepo, TemplateRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: MapConfigRepo + TemplateRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Close the underlying pool.
    async fn close(&self);
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite store and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // A single connection serializes writers and avoids "database is locked".
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;

    #[async_trait]
    impl MapConfigRepo for SqliteStore {
        async fn insert_map_config(&self, row: &MapConfigRow) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                INSERT INTO mapconfigs (token, config_json, layer_count, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(token) DO NOTHING
                "#,
            )
            .bind(&row.token)
            .bind(&row.config_json)
            .bind(row.layer_count)
            .bind(row.created_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        }

        async fn get_map_config(&self, token: &str) -> MetadataResult<Option<MapConfigRow>> {
            let row =
                sqlx::query_as::<_, MapConfigRow>("SELECT * FROM mapconfigs WHERE token = ?")
                    .bind(token)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn purge_map_configs_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM mapconfigs WHERE created_at < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn count_map_configs(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mapconfigs")
                .fetch_one(&self.pool)
                .await?;
            Ok(count.max(0) as u64)
        }
    }

    #[async_trait]
    impl TemplateRepo for SqliteStore {
        async fn put_template(&self, row: &TemplateRow) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let existed: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM templates WHERE owner = ? AND name = ?)",
            )
            .bind(&row.owner)
            .bind(&row.name)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO templates (owner, name, template_json, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(owner, name) DO UPDATE SET
                    template_json = excluded.template_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&row.owner)
            .bind(&row.name)
            .bind(&row.template_json)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(!existed)
        }

        async fn update_template(&self, row: &TemplateRow) -> MetadataResult<bool> {
            let result = sqlx::query(
                "UPDATE templates SET template_json = ?, updated_at = ? WHERE owner = ? AND name = ?",
            )
            .bind(&row.template_json)
            .bind(row.updated_at)
            .bind(&row.owner)
            .bind(&row.name)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn get_template(
            &self,
            owner: &str,
            name: &str,
        ) -> MetadataResult<Option<TemplateRow>> {
            let row = sqlx::query_as::<_, TemplateRow>(
                "SELECT * FROM templates WHERE owner = ? AND name = ?",
            )
            .bind(owner)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn delete_template(&self, owner: &str, name: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM templates WHERE owner = ? AND name = ?")
                .bind(owner)
                .bind(name)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_templates(&self, owner: &str) -> MetadataResult<Vec<TemplateRow>> {
            let rows = sqlx::query_as::<_, TemplateRow>(
                "SELECT * FROM templates WHERE owner = ? ORDER BY name",
            )
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS mapconfigs (
    token TEXT PRIMARY KEY,
    config_json TEXT NOT NULL,
    layer_count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mapconfigs_created_at ON mapconfigs(created_at);

CREATE TABLE IF NOT EXISTS templates (
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    template_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (owner, name)
);
"#;
