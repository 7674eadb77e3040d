//! PostgreSQL container for executor tests.

use layergroup_query::{PostgresExecutor, QueryError, QueryResult};
use std::time::Duration;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Marker carried by container startup failures so tests can skip them.
#[allow(dead_code)]
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// An executor connected to a throwaway PostgreSQL container.
#[allow(dead_code)]
pub struct PostgresTestExecutor {
    pub executor: PostgresExecutor,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestExecutor {
    #[allow(dead_code)]
    pub async fn new(timeout: Duration) -> QueryResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                QueryError::Connection(format!(
                    "{POSTGRES_CONTAINER_START_ERR_PREFIX} Failed to start PostgreSQL container: {e}"
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");
        let executor = PostgresExecutor::connect(&url, 2, timeout).await?;

        Ok(Self {
            executor,
            _container: container,
        })
    }
}

/// Start a container, or `None` when Docker is unavailable or
/// `SKIP_POSTGRES_TESTS` is set. Other setup failures panic.
#[allow(dead_code)]
pub async fn postgres_or_skip(timeout: Duration) -> Option<PostgresTestExecutor> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match PostgresTestExecutor::new(timeout).await {
        Ok(executor) => Some(executor),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}
