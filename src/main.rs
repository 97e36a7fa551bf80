//! Audio Keeper daemon.
//!
//! Runs the reconciliation engine against the Windows audio subsystem until
//! Ctrl-C. Usage: `audio-keeper [config.json]`.

use anyhow::{Context, Result};
use audio_keeper::AppConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    init_logging(config.log_level.as_deref().unwrap_or("info"));
    info!(config = ?config_path, "Starting Audio Keeper...");

    run(config).await?;

    info!("Audio Keeper shutdown complete");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();
}

#[cfg(windows)]
async fn run(config: AppConfig) -> Result<()> {
    use audio_keeper::audio::mmdevice::ComGuard;
    use audio_keeper::audio::WindowsBackend;
    use audio_keeper::{AppState, MemoryPreferenceStore, Monitoring};
    use std::sync::Arc;
    use tracing::{debug, warn};

    // Keeps the multithreaded apartment alive for notification registrations
    let _com = ComGuard::new().context("COM initialization failed")?;
    let backend = Arc::new(WindowsBackend::new().context("Audio subsystem unavailable")?);

    let (mut app, mut events) =
        AppState::new(backend, MemoryPreferenceStore::new(), config.engine.clone());
    if app.initialize(config.preference.clone()) == Monitoring::Degraded {
        warn!("Device notifications unavailable; preferences are only applied on change");
    }
    info!(status = %app.status_line(), "Watching default devices");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(event) = events.recv() => {
                let previous_error = app.error_message.clone();
                app.handle_engine_event(event);
                if app.error_message != previous_error {
                    if let Some(error) = &app.error_message {
                        warn!(%error, "engine reported a problem");
                    }
                }
                debug!(status = %app.status_line(), "status");
            }
        }
    }

    app.shutdown().await;
    Ok(())
}

#[cfg(not(windows))]
async fn run(_config: AppConfig) -> Result<()> {
    anyhow::bail!("no audio backend is available for this platform")
}

#[cfg(windows)]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
