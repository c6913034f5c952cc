use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use feedboard::config::{DashboardConfig, Settings};
use feedboard::dashboard::Dashboard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _log_guard = match &settings.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "feedboard.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr.and(file_writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    let config = DashboardConfig::load(&settings.config_path)
        .with_context(|| format!("failed to load {}", settings.config_path.display()))?;

    let cancel = CancellationToken::new();
    let dashboard = Arc::new(
        Dashboard::from_config(&config, cancel.clone()).context("failed to build dashboard")?,
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %settings.config_path.display(),
        widgets = dashboard.len(),
        tick_interval = ?dashboard.tick_interval(),
        "Feedboard starting"
    );

    if settings.once {
        dashboard.update_outdated(chrono::Utc::now()).await;
        let snapshots = dashboard.snapshots().await;
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    // Initial sweep so every widget has content before the first tick
    dashboard.update_outdated(chrono::Utc::now()).await;

    let ticker = Arc::clone(&dashboard).spawn_ticker(dashboard.tick_interval(), cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutdown requested");
    cancel.cancel();
    if let Err(e) = ticker.await {
        tracing::error!(error = %e, "Ticker task failed");
    }

    tracing::info!("Feedboard stopped");
    Ok(())
}
