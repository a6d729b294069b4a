//! Hookpool
//!
//! Keeps every text channel of a community stocked with webhooks and runs a
//! send loop per webhook.
//!
//! ## Startup
//!
//! - Loads `.env`, then the JSON/TOML config (`HOOKPOOL_CONFIG` or the
//!   default search path), with `HOOKPOOL_*` environment overrides
//! - Loads the message pool (missing file falls back to a single body)
//! - Verifies the bot token against the API before doing any work
//!
//! Ctrl+C or SIGTERM stops the reconciliation driver, then gives running
//! send loops `shutdownGraceMs` to finish.

use std::process::ExitCode;
use std::sync::Arc;
use anyhow::{Context, Result};
use hp_config::{AppConfig, ConfigLoader};
use hp_engine::{
    DiscordService, DiscordServiceConfig, Engine, EngineConfig, FileSink, MessagePool,
    MessagingService, Pacing, ProvisionerConfig, ReconcilerConfig,
};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    hp_common::logging::init_logging("hookpool");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    info!("Starting Hookpool");

    // 1. Configuration
    let config = ConfigLoader::new().load().context("loading configuration")?;
    info!(
        community_id = %config.community_id,
        desired_per_channel = config.desired_per_channel,
        scan_every_ms = config.scan_every_ms,
        create_burst = config.create_burst,
        burst_window_ms = config.burst_window_ms,
        "Configuration loaded"
    );

    // 2. Message pool
    let messages = Arc::new(
        MessagePool::from_file(&config.messages_file).context("loading message pool")?,
    );

    // 3. Messaging service + login check
    let service = DiscordService::with_config(
        config.token.clone(),
        DiscordServiceConfig {
            api_base_url: config.api_base_url.clone(),
            request_timeout: config.request_timeout(),
            ..Default::default()
        },
    )
    .context("building HTTP client")?;

    let identity = service.current_identity().await.context("logging in")?;
    info!(user = %identity.username, user_id = %identity.id, "Logged in");

    // 4. Engine
    let sink = Arc::new(FileSink::new(&config.webhooks_file));
    let engine = Engine::new(Arc::new(service), sink, messages, engine_config(&config));
    let driver = engine.start();

    info!(webhooks_file = %config.webhooks_file, "Hookpool running");

    // 5. Wait for shutdown
    shutdown_signal().await;
    info!("Shutdown signal received, stopping");

    engine.shutdown(driver).await;

    info!("Hookpool shutdown complete");
    Ok(())
}

fn engine_config(config: &AppConfig) -> EngineConfig {
    let (send_min, send_max) = config.send_delay_range();
    EngineConfig {
        provisioner: ProvisionerConfig {
            community_id: config.community_id.clone(),
            desired_per_channel: config.desired_per_channel,
            create_burst: config.create_burst,
            burst_window: config.burst_window(),
            endpoint_name: config.webhook_name.clone(),
            webhook_base_url: config.webhook_base_url.clone(),
        },
        reconciler: ReconcilerConfig {
            interval: config.scan_interval(),
        },
        pacing: Pacing::new(send_min, send_max),
        shutdown_grace: config.shutdown_grace(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
