//! SQLite query executor.
//!
//! The database file is opened with `SQLITE_OPEN_READONLY`, so no statement
//! can modify it whatever the connection's pragmas say. Every statement runs
//! under a progress handler that interrupts it once its deadline passes, which
//! frees the connection instead of leaving it busy after a timeout.

use crate::error::{QueryError, QueryResult};
use crate::sql;
use crate::traits::{FeatureId, FeatureQuery, QueryExecutor, Row};
use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Pool, Row as _, Sqlite, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Virtual machine instructions between deadline checks.
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

/// Time past the deadline after which a statement that ignored the progress
/// handler is abandoned together with its connection.
const ABANDON_GRACE: Duration = Duration::from_secs(1);

/// Read-only executor over a SQLite database file.
pub struct SqliteExecutor {
    pool: Pool<Sqlite>,
    timeout: Duration,
}

impl SqliteExecutor {
    /// Open an existing database file for read-only querying.
    pub async fn open(path: impl AsRef<Path>, timeout: Duration) -> QueryResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(QueryError::Config(format!(
                "query database not found: {}",
                path.display()
            )));
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .read_only(true)
            .pragma("query_only", "ON")
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        tracing::info!(path = %path.display(), "SQLite query executor ready");
        Ok(Self { pool, timeout })
    }

    fn timeout_error(&self) -> QueryError {
        QueryError::Timeout(self.timeout.as_millis() as u64)
    }

    /// Arm the connection so its statements stop at `deadline`. The returned
    /// flag is set when the handler interrupts a statement.
    async fn arm_deadline(
        conn: &mut PoolConnection<Sqlite>,
        deadline: Instant,
    ) -> QueryResult<Arc<AtomicBool>> {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        conn.lock_handle()
            .await?
            .set_progress_handler(PROGRESS_INTERVAL_OPS, move || {
                if Instant::now() < deadline {
                    true
                } else {
                    flag.store(true, Ordering::Relaxed);
                    false
                }
            });
        Ok(fired)
    }

    async fn run(&self, sql: &str, bind: Option<&FeatureId>) -> QueryResult<Vec<Row>> {
        let started = Instant::now();
        let mut conn = self.pool.acquire().await?;
        let interrupted = Self::arm_deadline(&mut conn, started + self.timeout).await?;

        let mut query = sqlx::query(sql);
        if let Some(id) = bind {
            query = match id {
                FeatureId::Int(n) => query.bind(*n),
                FeatureId::Text(s) => query.bind(s.clone()),
            };
        }

        let outcome =
            tokio::time::timeout(self.timeout + ABANDON_GRACE, query.fetch_all(&mut *conn)).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("sqlite statement ignored its deadline; dropping connection");
                drop(conn.detach());
                return Err(self.timeout_error());
            }
        };

        if let Ok(mut handle) = conn.lock_handle().await {
            handle.remove_progress_handler();
        }

        let rows = match result {
            Ok(rows) => rows,
            Err(_) if interrupted.load(Ordering::Relaxed) => {
                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sqlite statement interrupted at deadline"
                );
                return Err(self.timeout_error());
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sqlite query finished"
        );

        rows.iter().map(decode_row).collect()
    }
}

/// Decode a row by the dynamic type of each value.
fn decode_row(row: &SqliteRow) -> QueryResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(index)?),
                "REAL" => Number::from_f64(row.try_get::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(index)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get::<String, _>(index)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn query(&self, sql: &str) -> QueryResult<Vec<Row>> {
        self.run(sql, None).await
    }

    async fn fetch_feature(&self, query: &FeatureQuery<'_>) -> QueryResult<Vec<Row>> {
        let sql = sql::feature_sql(query.sql, query.id_column, query.columns, "?")?;
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
