//! Main entry point for the duet matchmaking service
//!
//! Loads configuration, validates the required platform token, and runs the
//! core with its health endpoint and maintenance job until a shutdown
//! signal arrives.

use anyhow::Result;
use clap::Parser;
use duet::config::AppConfig;
use duet::service::AppState;
use duet::transport::TracingOutbound;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Duet - anonymous 1:1 chat matchmaking service
#[derive(Parser)]
#[command(
    name = "duet",
    version,
    about = "Anonymous 1:1 chat matchmaking with mini-games and a points economy",
    long_about = "Duet pairs anonymous users for one-on-one conversation, relays their \
                 messages with word-filter penalties, runs a board game and a number-guessing \
                 game with reward settlement, and tracks a points/stars economy with VIP tiers."
)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override health endpoint port
    #[arg(long, value_name = "PORT")]
    health_port: Option<u16>,

    /// Validate configuration and exit without starting the service
    #[arg(long)]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Load configuration from file or environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(path) = &args.config {
        AppConfig::from_file(path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    Ok(config)
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

fn display_startup_banner(config: &AppConfig) {
    info!("Duet matchmaking service v{}", duet::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    config.log_options();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    // A missing platform token is fatal: better to exit than run degraded
    let mut app_state = match AppState::new(config.clone(), Arc::new(TracingOutbound)) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start() {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    match app_state.health() {
        Ok(report) => info!(
            "Initial health: {} ({} users known)",
            report.status, report.stats.users_total
        ),
        Err(e) => warn!("Initial health check failed: {}", e),
    }

    info!("Duet service is running; press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    let shutdown = app_state.stop();
    match tokio::time::timeout(config.shutdown_timeout(), shutdown).await {
        Ok(()) => info!("Graceful shutdown completed"),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Duet service stopped");
    Ok(())
}
