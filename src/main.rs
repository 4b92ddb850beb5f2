//! statuscache binary entry point

use statuscache::{StatusCache, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Open the status cache
/// 4. Start the periodic retention task (if configured)
/// 5. Sweep once more when asked to stop, then close the store
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("STATUSCACHE__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let log_level =
        std::env::var("STATUSCACHE__LOGGING__LEVEL").unwrap_or_else(|_| "info".to_string());
    let default_filter = format!("statuscache={}", log_level);

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting statuscache...");

    statuscache::metrics::init_metrics();

    // 2. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        path = %config.database.path.display(),
        max_age_seconds = config.retention.max_age_seconds,
        "Configuration loaded"
    );

    // 3. Open the cache
    let cache = StatusCache::open(config).await?;

    // 4. Start background tasks
    if cache.config.retention.sweep_interval_seconds > 0 {
        spawn_retention_task(cache.clone());
    }

    // 5. Treat shutdown as the "entered background" signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, running retention sweep");
    match cache.on_background().await {
        Ok(deleted) => tracing::info!(deleted, "Final sweep completed"),
        Err(error) => tracing::error!(%error, "Final sweep failed"),
    }

    match statuscache::metrics::gather() {
        Ok(text) => tracing::debug!(metrics = %text, "Metrics at shutdown"),
        Err(error) => tracing::warn!(%error, "Could not render metrics"),
    }

    cache.close().await;

    Ok(())
}

/// Spawn background retention task
fn spawn_retention_task(cache: StatusCache) {
    tokio::spawn(async move {
        let interval_secs = cache.config.retention.sweep_interval_seconds;
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick to delay the first sweep by one interval.
        interval.tick().await;

        loop {
            interval.tick().await;

            tracing::info!("Running scheduled retention sweep...");
            match cache.sweep().await {
                Ok(deleted) => tracing::info!(deleted, "Retention sweep completed"),
                Err(error) => tracing::error!(%error, "Retention sweep failed"),
            }
        }
    });

    tracing::info!("Retention task spawned");
}
