//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8181").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Owner scope of named templates; authenticated usernames must match it.
    #[serde(default = "default_user")]
    pub user: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Directory of `*.json` template definitions registered at startup.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
}

fn default_bind() -> String {
    "127.0.0.1:8181".to_string()
}

fn default_user() -> String {
    "localhost".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            user: default_user(),
            metrics_enabled: default_metrics_enabled(),
            max_body_size: default_max_body_size(),
            templates_dir: None,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.user.trim().is_empty() {
            return Err("server.user cannot be empty".to_string());
        }
        if self.max_body_size == 0 {
            return Err("server.max_body_size cannot be 0".to_string());
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration (cached configurations and templates).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer LAYERGROUP_METADATA__PASSWORD over storing it in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Backend the read-only query executor runs against.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryBackendConfig {
    /// SQLite database file, opened with `query_only`.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL, every query in a read-only transaction.
    Postgres {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl Default for QueryBackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/layers.db"),
        }
    }
}

/// Query executor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Data backend.
    #[serde(default)]
    pub backend: QueryBackendConfig,
    /// Per-query timeout in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_query_timeout_ms() -> u64 {
    5_000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            backend: QueryBackendConfig::default(),
            timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl QueryConfig {
    /// Query timeout as a std Duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    /// Validate query configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("query.timeout_ms cannot be 0".to_string());
        }
        if let QueryBackendConfig::Postgres {
            url,
            max_connections,
        } = &self.backend
        {
            if url.trim().is_empty() {
                return Err("query.backend.url cannot be empty".to_string());
            }
            if *max_connections == 0 {
                return Err("query.backend.max_connections cannot be 0".to_string());
            }
        }
        Ok(())
    }
}

/// Credential configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Key identifier used when a request carries no credential.
    #[serde(default = "default_api_key")]
    pub default_api_key: String,
    /// SHA-256 hex digests of master keys allowed to mutate templates.
    /// Generate with: `echo -n "your-secret-key" | sha256sum`
    #[serde(default)]
    pub master_key_hashes: Vec<String>,
}

fn default_api_key() -> String {
    "default-public".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_api_key: default_api_key(),
            master_key_hashes: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Master key hashes lowercased, with any `sha256:` prefix removed.
    pub fn normalized_master_key_hashes(&self) -> Vec<String> {
        self.master_key_hashes
            .iter()
            .map(|hash| {
                let hash = hash.trim();
                hash.strip_prefix("sha256:")
                    .unwrap_or(hash)
                    .to_ascii_lowercase()
            })
            .collect()
    }

    /// Validate credential configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        for hash in self.normalized_master_key_hashes() {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(format!(
                    "auth.master_key_hashes entry must be 64 hex characters (SHA-256), got {} characters",
                    hash.len()
                ));
            }
        }
        Ok(())
    }
}

/// Configuration cache retention.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries older than this are purged. `None` keeps entries forever.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    /// Interval between purge sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Validate cache configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs.is_some() && self.sweep_interval_secs == 0 {
            return Err("cache.sweep_interval_secs cannot be 0 when ttl_secs is set".to_string());
        }
        if let Some(ttl) = self.ttl_secs
            && ttl > i64::MAX as u64
        {
            return Err(format!(
                "cache.ttl_secs {ttl} exceeds maximum value {}",
                i64::MAX
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Query executor configuration.
    #[serde(default)]
    pub query: QueryConfig,
    /// Credential configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Configuration cache retention.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite for metadata and queries, and a
    /// master key hash for "test-master-key".
    pub fn for_testing() -> Self {
        Self {
            auth: AuthConfig {
                default_api_key: default_api_key(),
                // SHA256 of "test-master-key"
                master_key_hashes: vec![
                    "94fc76f664e808de8653e045387d082caa15dd8092ec07f3d9f6c1d82056c97d".to_string(),
                ],
            },
            ..Self::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.metadata.validate()?;
        self.query.validate()?;
        self.auth.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}
