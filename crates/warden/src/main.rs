//! # Warden - breach-check engine
//!
//! Serves password validation over HTTP and runs the background workers:
//! cache sweeping, connectivity probing, and offline replay.
//!
//! ## Architecture
//! ```text
//! Client → Warden → Pwned Passwords range API
//!            ↓
//!   cache / circuit / retry (in-memory)
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use warden::cache::cache_sweep_worker;
use warden::config::{AppConfig, Overrides};
use warden::connectivity::{ProbeConfig, connectivity_probe_worker};
use warden::routes;
use warden::state::Services;

/// Warden - resilient password breach checking
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/warden.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Range API base URL (overrides config)
    #[arg(long, env = "WARDEN_API_URL")]
    api_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🛡️ Starting Warden v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let overrides = Overrides {
        listen_addr: args.listen.clone(),
        api_base_url: args.api_url.clone(),
    };
    let config = AppConfig::load(&args.config, &overrides)?;
    info!("📋 Configuration loaded from {}", args.config);

    let services = Services::new(config.clone())?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Spawn cache sweeper
    let cache = services.cache.clone();
    let sweep_interval = Duration::from_secs(config.cache.sweep_interval_secs);
    let sweep_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        cache_sweep_worker(cache, sweep_interval, sweep_shutdown).await;
    });

    // Spawn connectivity probe
    let probe = ProbeConfig {
        url: config.offline.probe_url.clone(),
        interval: Duration::from_secs(config.offline.probe_interval_secs),
        timeout: Duration::from_millis(config.verification.request_timeout_ms),
    };
    let monitor = services.connectivity.clone();
    let http = services.http.clone();
    let probe_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        connectivity_probe_worker(monitor, http, probe, probe_shutdown).await;
    });

    // Replay queued operations on reconnect
    let _replay = services.offline.attach();

    // Build router
    let app = routes::create_router(services);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Warden listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Warden shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
