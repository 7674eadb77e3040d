//! PostgreSQL query executor.
//!
//! Each statement runs inside its own transaction marked `READ ONLY`, and the
//! transaction is always rolled back. Rows come back as `to_jsonb` objects so
//! every column type, numeric and temporal ones included, keeps the rendering
//! PostgreSQL gives it.

use crate::error::{QueryError, QueryResult};
use crate::sql;
use crate::traits::{FeatureId, FeatureQuery, QueryExecutor, Row};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row as _};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Extra time the server-side statement timeout allows past the client-side one.
const STATEMENT_TIMEOUT_GRACE_MS: u64 = 1_000;

/// Read-only executor over a PostgreSQL database.
pub struct PostgresExecutor {
    pool: Pool<Postgres>,
    timeout: Duration,
}

impl PostgresExecutor {
    /// Connect to the database at `url`.
    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> QueryResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        tracing::info!(max_connections, "PostgreSQL query executor ready");
        Ok(Self { pool, timeout })
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    async fn run(&self, sql: &str, bind: Option<&FeatureId>) -> QueryResult<Vec<Row>> {
        let started = Instant::now();
        let sql = sql::json_rows_sql(sql)?;

        let work = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await?;
            // Backstop for statements abandoned by the client-side timeout.
            sqlx::query(&format!(
                "SET LOCAL statement_timeout = {}",
                self.timeout_ms() + STATEMENT_TIMEOUT_GRACE_MS
            ))
            .execute(&mut *tx)
            .await?;

            let mut query = sqlx::query(&sql);
            if let Some(id) = bind {
                query = match id {
                    FeatureId::Int(n) => query.bind(*n),
                    FeatureId::Text(s) => query.bind(s.clone()),
                };
            }
            let rows = query.fetch_all(&mut *tx).await;

            if let Err(e) = tx.rollback().await {
                tracing::debug!(error = %e, "rollback of read-only transaction failed");
            }
            rows.map_err(QueryError::from)
        };

        let rows = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| QueryError::Timeout(self.timeout_ms()))??;

        tracing::debug!(
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "postgres query finished"
        );

        rows.iter().map(decode_row).collect()
    }
}

/// Unpack the single JSONB column produced by [`sql::json_rows_sql`].
fn decode_row(row: &PgRow) -> QueryResult<Row> {
    match row.try_get::<Option<Value>, _>(0)? {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(QueryError::Execution(format!(
            "expected a row object, got {other}"
        ))),
        None => Ok(Row::new()),
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn query(&self, sql: &str) -> QueryResult<Vec<Row>> {
        self.run(sql, None).await
    }

    async fn fetch_feature(&self, query: &FeatureQuery<'_>) -> QueryResult<Vec<Row>> {
        let sql = sql::feature_sql(query.sql, query.id_column, query.columns, "$1")?;
        self.run(&sql, Some(query.feature_id)).await
    }

    async fn check_columns(
        &self,
        sql: &str,
        id_column: &str,
        columns: &[String],
    ) -> QueryResult<()> {
        self.run(&sql::check_columns_sql(sql, id_column, columns)?, None)
            .await
            .map(|_| ())
    }

    async fn health_check(&self) -> QueryResult<()> {
        self.run("SELECT 1", None).await.map(|_| ())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
