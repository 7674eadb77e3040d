//! Layergroup server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use layergroup_core::config::AppConfig;
use layergroup_server::bootstrap::seed_templates;
use layergroup_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Layergroup - map configuration tokens, attributes and named maps
#[derive(Parser, Debug)]
#[command(name = "layergroupd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LAYERGROUP_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional TOML file overridden by
/// `LAYERGROUP_`-prefixed environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LAYERGROUP_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Layergroup v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    layergroup_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = layergroup_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!("Metadata store initialized");

    let executor = layergroup_query::from_config(&config.query)
        .await
        .context("failed to initialize query executor")?;
    executor
        .health_check()
        .await
        .context("query executor health check failed")?;
    tracing::info!("Query executor initialized");

    if let Some(dir) = &config.server.templates_dir {
        let seeded = seed_templates(metadata.as_ref(), &config.server.user, dir).await?;
        tracing::info!(count = seeded, dir = %dir.display(), "Templates seeded");
    }

    let state = AppState::new(config.clone(), metadata.clone(), executor.clone());
    let _sweeper = state.spawn_cache_sweeper();

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    executor.close().await;
    metadata.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
