//! Long-running service entry point.
//!
//! Loads configuration, initializes structured logging, bootstraps the
//! database and flow orchestrator, exposes the health endpoint, and then
//! waits for a shutdown signal.

use std::process::ExitCode;

use tracing::{error, info};

use voyage_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};

mod bootstrap;
mod health;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("voyage-server failed to start: {error}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run() -> Result<(), bootstrap::BootstrapError> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config.logging);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        app.config.server.bind_address.clone(),
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await
    .map_err(bootstrap::BootstrapError::HealthListener)?;

    info!(
        event_name = "server_started",
        bind_address = %app.config.server.bind_address,
        health_check_port = app.config.server.health_check_port,
        "voyage-server ready",
    );

    wait_for_shutdown().await;
    info!(event_name = "server_shutdown", "voyage-server shutting down");
    app.db_pool.close().await;
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let level = logging.level.parse().unwrap_or(tracing::Level::INFO);
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(level);

    match logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "signal_listen_failed",
            %error,
            "failed to listen for shutdown signal",
        );
    }
}
