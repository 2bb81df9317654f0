//! notehub-server - collaborative markdown notes
//!
//! Serves the note pages, the JSON API and the realtime editing socket from
//! one process backed by a SQLite database under the root folder.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use notehub_common::config::{locate_config_file, Overrides, ServerConfig, TomlConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notehub_server::db::users;
use notehub_server::AppState;

/// Command-line arguments for notehub-server
#[derive(Parser, Debug)]
#[command(name = "notehub-server")]
#[command(about = "Collaborative markdown note server")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "NOTEHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and uploads
    #[arg(short, long, env = "NOTEHUB_ROOT")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "NOTEHUB_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "NOTEHUB_PORT")]
    port: Option<u16>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "NOTEHUB_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load(args.config.as_deref());
    let config = ServerConfig::resolve(
        toml_config,
        Overrides {
            root_folder: args.root_folder.clone(),
            host: args.host.clone(),
            port: args.port,
            log_level: args.log_level.clone(),
        },
    )
    .context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("notehub_server={0},notehub_common={0},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting notehub-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match locate_config_file(args.config.as_deref()) {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => warn!("No configuration file found, using defaults"),
    }
    info!("Root folder: {}", config.root_folder.display());

    config
        .ensure_directories()
        .context("Failed to initialize root folder")?;

    info!("Database: {}", config.db_path.display());
    let db = notehub_common::db::init_database(&config.db_path)
        .await
        .context("Failed to open database")?;

    let purged = users::purge_expired_sessions(&db).await?;
    if purged > 0 {
        info!(sessions = purged, "Removed expired sessions");
    }

    let bind_addr = config.bind_addr();
    let server_url = config.server_url.clone();
    let state = AppState::new(db, config);

    let shutdown = CancellationToken::new();
    let flush_task = state.pool.spawn_flush_task(shutdown.clone());
    let pool = state.pool.clone();

    let app = notehub_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);
    info!("Public URL: {}", server_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = flush_task.await {
        error!("Flush task ended abnormally: {}", e);
    }
    let saved = pool.flush_dirty().await;
    info!(notes = saved, "Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
