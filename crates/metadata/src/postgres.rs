//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{MapConfigRepo, TemplateRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use layergroup_core::config::{MetadataConfig, PgSslMode};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect with a `type = "postgres"` metadata config and apply the schema.
    ///
    /// `url` wins over the individual fields so the password can come from
    /// either a URL or `LAYERGROUP_METADATA__PASSWORD`.
    pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Self> {
        let MetadataConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } = config
        else {
            return Err(MetadataError::Config(
                "expected a postgres metadata config".to_string(),
            ));
        };

        let mut options = match (url, host, database) {
            (Some(url), _, _) => PgConnectOptions::from_str(url)?,
            (None, Some(host), Some(database)) => {
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .port(port.unwrap_or(5432))
                    .database(database);
                if let Some(username) = username {
                    options = options.username(username);
                }
                if let Some(password) = password {
                    options = options.password(password);
                }
                options
            }
            _ => {
                return Err(MetadataError::Config(
                    "postgres metadata needs 'url' or 'host' and 'database'".to_string(),
                ));
            }
        };

        if let Some(mode) = ssl_mode {
            options = options.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }
        if let Some(timeout_ms) = statement_timeout_ms {
            options = options.options([("statement_timeout", format!("{timeout_ms}ms"))]);
        }

        tracing::info!(
            host = options.get_host(),
            database = options.get_database().unwrap_or("<default>"),
            max_connections = *max_connections,
            statement_timeout_ms = ?statement_timeout_ms,
            "Connecting to PostgreSQL metadata store"
        );

        let pool = PgPoolOptions::new()
            .max_connections(*max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements hold one statement each.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
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

#[async_trait]
impl MapConfigRepo for PostgresStore {
    async fn insert_map_config(&self, row: &MapConfigRow) -> MetadataResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO mapconfigs (token, config_json, layer_count, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token) DO NOTHING
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
        let row = sqlx::query_as::<_, MapConfigRow>("SELECT * FROM mapconfigs WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn purge_map_configs_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM mapconfigs WHERE created_at < $1")
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
impl TemplateRepo for PostgresStore {
    async fn put_template(&self, row: &TemplateRow) -> MetadataResult<bool> {
        // xmax is 0 only for freshly inserted tuples.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO templates (owner, name, template_json, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (owner, name) DO UPDATE SET
                template_json = EXCLUDED.template_json,
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0)
            "#,
        )
        .bind(&row.owner)
        .bind(&row.name)
        .bind(&row.template_json)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn update_template(&self, row: &TemplateRow) -> MetadataResult<bool> {
        let result = sqlx::query(
            "UPDATE templates SET template_json = $1, updated_at = $2 WHERE owner = $3 AND name = $4",
        )
        .bind(&row.template_json)
        .bind(row.updated_at)
        .bind(&row.owner)
        .bind(&row.name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_template(&self, owner: &str, name: &str) -> MetadataResult<Option<TemplateRow>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT * FROM templates WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_template(&self, owner: &str, name: &str) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM templates WHERE owner = $1 AND name = $2")
            .bind(owner)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_templates(&self, owner: &str) -> MetadataResult<Vec<TemplateRow>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            "SELECT * FROM templates WHERE owner = $1 ORDER BY name",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
