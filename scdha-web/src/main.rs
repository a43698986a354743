//! scdha-web - upload front-end for scDHA time inference
//!
//! Accepts expression matrix (and optional metadata) uploads, runs the R
//! analysis routine on them and serves the resulting image and tables.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scdha_common::config::{load_config, ConfigOverrides};
use scdha_web::analysis::RscriptBackend;
use scdha_web::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for scdha-web
#[derive(Parser, Debug)]
#[command(name = "scdha-web")]
#[command(about = "Upload front-end for scDHA time inference")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SCDHA_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "SCDHA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SCDHA_PORT")]
    port: Option<u16>,

    /// Working root holding uploaded_files/, processed_files/, images/, public/ and index.html
    #[arg(short, long, env = "SCDHA_ROOT")]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let mut config = loaded.config.apply_overrides(&ConfigOverrides {
        host: args.host,
        port: args.port,
        root: args.root,
    });

    // Initialize tracing: RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{0},scdha_web={0},tower_http={0}", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting scdha-web v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &loaded.source {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No config file found, using compiled defaults"),
    }

    // The R process runs inside the root, so every path handed to it must be absolute
    let root = std::fs::canonicalize(&config.storage.root).with_context(|| {
        format!("Storage root not accessible: {}", config.storage.root.display())
    })?;
    config.storage.root = root.clone();
    info!("Storage root: {}", root.display());

    let backend = RscriptBackend::from_config(&config.analysis, root.clone());
    info!(
        rscript = %config.analysis.rscript,
        script = %config.analysis.script.display(),
        function = %config.analysis.function,
        max_concurrent = config.analysis.max_concurrent,
        timeout_secs = ?config.analysis.timeout_secs,
        strict_status = config.analysis.strict_status,
        "Analysis backend configured"
    );

    let state = AppState::new(&config, Arc::new(backend));
    state
        .layout
        .ensure_directories()
        .context("Failed to create storage directories")?;

    let app = build_router(state);

    let addr = config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("scdha-web listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
