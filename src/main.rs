//! Semker - Main Entry Point
//!
//! Loads the configuration, assembles the engine and serves the HTTP surface
//! until SIGINT or SIGTERM, then drains in-flight requests.

use clap::{Parser, Subcommand};
use semker::config::SemkerConfig;
use semker::observability::init_default_logging;
use semker::transport::{self, ApiState};
use semker::Engine;
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATHS: &[&str] = &["semker.toml", "config/semker.toml"];

/// Asynchronous message-lifecycle engine with agent routing
#[derive(Parser)]
#[command(name = "semker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SEMKER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting Semker v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: Option<&Path>) -> Result<SemkerConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(SemkerConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(SemkerConfig::load_from_file(path)?);
        }
    }

    Err(format!(
        "No configuration file found. Provide one with -c/--config or create {}",
        DEFAULT_CONFIG_PATHS.join(" or ")
    )
    .into())
}

async fn serve(config: SemkerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.bind_address()?;
    let engine = Engine::from_config(config)?;
    let sweeper = engine.spawn_retention();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(transport::serve(
        ApiState::new(engine.scheduler.clone()),
        addr,
        async move {
            let _ = stop_rx.await;
        },
    ));

    wait_for_shutdown_signal().await?;

    // Stop intake first so no request is accepted after the drain starts.
    info!("Application shutdown initiated");
    let _ = stop_tx.send(());
    engine.scheduler.shutdown().await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    match server.await {
        Ok(result) => result?,
        Err(e) => warn!("HTTP server task ended abnormally: {}", e),
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<(), Box<dyn std::error::Error>> {
    signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down gracefully...");
    Ok(())
}

fn handle_config_command(config: &SemkerConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
