//! Server test utilities.

use super::fixtures::seeded_database;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use layergroup_core::config::{AppConfig, MetadataConfig, QueryBackendConfig};
use layergroup_metadata::{MetadataStore, SqliteStore};
use layergroup_query::{QueryExecutor, SqliteExecutor};
use layergroup_server::{AppState, create_router};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// The seeded layer database behind the executor.
    pub data_path: PathBuf,
    _temp_dir: TempDir,
}

/// A response as seen by a client.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&self.body).unwrap_or(Value::Null)
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server backed by temporary SQLite files.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let data_path = seeded_database(temp_dir.path()).await;
        let db_path = temp_dir.path().join("metadata.db");

        let mut config = AppConfig::for_testing();
        config.metadata = MetadataConfig::Sqlite {
            path: db_path.clone(),
        };
        config.query.backend = QueryBackendConfig::Sqlite {
            path: data_path.clone(),
        };
        modifier(&mut config);

        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );
        let executor: Arc<dyn QueryExecutor> = Arc::new(
            SqliteExecutor::open(&data_path, config.query.timeout())
                .await
                .expect("Failed to open query executor"),
        );

        Self::from_parts(config, metadata, executor, data_path, temp_dir)
    }

    /// Create a test server around a caller-provided executor.
    pub async fn with_executor(executor: Arc<dyn QueryExecutor>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let data_path = seeded_database(temp_dir.path()).await;
        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        Self::from_parts(
            AppConfig::for_testing(),
            metadata,
            executor,
            data_path,
            temp_dir,
        )
    }

    fn from_parts(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        executor: Arc<dyn QueryExecutor>,
        data_path: PathBuf,
        temp_dir: TempDir,
    ) -> Self {
        let state = AppState::new(config, metadata, executor);
        let router = create_router(state.clone());
        Self {
            router,
            state,
            data_path,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Send a request with optional JSON body and extra headers.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(v).unwrap())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    /// Send a JSON-typed request whose body is sent as given, valid or not.
    pub async fn request_raw(&self, method: &str, uri: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request("GET", uri, None, &[]).await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> TestResponse {
        self.request("POST", uri, Some(body), &[]).await
    }

    /// Create a layergroup and return its token.
    pub async fn create_layergroup(&self, config: &Value) -> String {
        let response = self.post("/api/v1/map", config).await;
        assert_eq!(
            response.status,
            StatusCode::OK,
            "create failed: {}",
            response.text()
        );
        response.json()["layergroupid"]
            .as_str()
            .expect("missing layergroupid")
            .to_string()
    }
}
