//! Darkroom server binary.

use anyhow::{Context, Result};
use clap::Parser;
use darkroom_core::config::AppConfig;
use darkroom_imaging::ImageProcessor;
use darkroom_server::{AppState, create_router, liveness};
use darkroom_storage::OriginalsStore;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Darkroom - an on-demand image resizing proxy
#[derive(Parser, Debug)]
#[command(name = "darkroomd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "DARKROOM_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
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

    tracing::info!("Darkroom v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("DARKROOM_") && key != "DARKROOM_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: darkroomd --config /path/to/config.toml\n  \
             2. Environment variables: DARKROOM_SERVER__BIND=0.0.0.0:1337 \
             DARKROOM_METADATA__TYPE=sqlite DARKROOM_METADATA__PATH=./darkroom.db darkroomd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set DARKROOM_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DARKROOM_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    darkroom_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = darkroom_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let originals = OriginalsStore::new(&config.originals_dir)
        .await
        .context("failed to open originals directory")?;
    tracing::info!(dir = %config.originals_dir.display(), "Originals store opened");

    let renditions = darkroom_storage::from_config(&config.storage)
        .await
        .context("failed to initialize rendition storage")?;

    // Verify storage connectivity before accepting requests. This catches
    // configuration errors early instead of on the first cache fill.
    renditions
        .health_check()
        .await
        .context("rendition storage health check failed")?;
    tracing::info!(backend = renditions.backend_name(), "Rendition storage verified");

    let fast = darkroom_server::fastcache::from_config(&config.fast_cache)
        .await
        .context("failed to initialize fast cache")?;

    let imaging = Arc::new(ImageProcessor::new(&config.imaging));

    let state = AppState::new(config.clone(), metadata, originals, renditions, imaging, fast);

    // The probe drains the server when the metadata store goes away.
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel();
    let _probe_handle =
        liveness::spawn_probe(state.metadata.clone(), state.liveness.clone(), drain_tx);

    let app = create_router(state.clone());

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = drain_rx => tracing::warn!("draining after metadata store failure"),
                _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
            }
        })
        .await?;

    // Distinguish a store-failure drain from a clean shutdown for process
    // supervisors.
    if !state.liveness.healthy() {
        std::process::exit(2);
    }

    Ok(())
}
