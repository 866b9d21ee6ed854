//! cu-manager - control-unit fleet manager
//!
//! Polls the catalog for rooms, runs one controller container per batch of
//! rooms, and keeps the fleet converged until interrupted.

use clap::Parser;
use cu_manager::{ManagerConfig, ManagerError, ManagerResult, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Control-unit manager CLI
#[derive(Parser)]
#[command(name = "cu-manager")]
#[command(about = "Control-unit manager - keeps controller containers in step with the catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CU_MANAGER_CONFIG")]
    config: Option<String>,

    /// Status API listen address
    #[arg(short, long, env = "CU_MANAGER_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "CU_MANAGER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CU_MANAGER_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> ManagerResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = ManagerConfig::load(cli.config.as_deref())
        .map_err(|e| ManagerError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| ManagerError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    config.validate().map_err(ManagerError::Config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        catalog = %config.catalog.url,
        image = %config.controllers.image,
        rooms_per_controller = config.controllers.rooms_per_controller,
        "Starting control-unit manager"
    );

    let server = Server::new(config).await?;
    server.run().await
}
