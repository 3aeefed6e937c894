//! Standalone headless server binary for the synchronized jukebox.

use anyhow::{Context, Result};
use clap::Parser;
use jukebox_core::{bootstrap_services, start_server, AppState, Config};
use std::sync::Arc;
use tokio::signal;

/// Headless multi-room synchronized jukebox server.
#[derive(Parser, Debug)]
#[command(name = "jukebox-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "JUKEBOX_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides the environment-derived configuration).
    #[arg(short = 'p', long, env = "JUKEBOX_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("jukebox-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.bind_port = port;
    }

    log::info!(
        "configuration: bind_port={}, bucket={}, workers={}",
        config.bind_port,
        config.supabase_bucket,
        config.youtube_download_max_workers
    );

    let services = Arc::new(bootstrap_services(config).context("failed to bootstrap services")?);
    log::info!("services bootstrapped successfully");

    let app_state = AppState::new(services.clone());

    let server_handle = tokio::spawn(async move {
        if let Err(err) = start_server(app_state).await {
            log::error!("server error: {err}");
        }
    });

    log::info!("HTTP/WS server started on port {}", services.config.bind_port);

    shutdown_signal().await;
    log::info!("shutdown signal received, cleaning up...");

    services.shutdown().await;
    server_handle.abort();

    log::info!("shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
