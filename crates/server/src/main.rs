mod bootstrap;
mod chat;
mod health;
mod session;
mod workflow;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use compass_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;

fn init_logging(config: &AppConfig) {
    use compass_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let drain_secs = app.config.server.graceful_shutdown_secs;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        provider = app.config.llm.provider.as_str(),
        "compass-server started"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = {
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(
                event_name = "system.server.stopping",
                "shutdown signal received, draining connections"
            );
            shutdown.notify_waiters();
        }
    };

    let server = axum::serve(listener, bootstrap::router(app)).with_graceful_shutdown(signal);

    // Bound the drain: once the signal fires, in-flight requests get
    // `graceful_shutdown_secs` to finish.
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        } => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                drain_secs,
                "graceful shutdown window elapsed, exiting"
            );
        }
    }

    tracing::info!(event_name = "system.server.stopped", "compass-server stopped");
    Ok(())
}
