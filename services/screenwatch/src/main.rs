//! Screenwatch - daily screening scheduler and watchlist service.
//!
//! Runs the screening algorithms once per trading day after the close and
//! keeps the ranked watchlist available to in-process callers.

use anyhow::Result;
use screenwatch::ScreenwatchService;
use screenwatch_common::config::Config;
use screenwatch_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Screenwatch v{}", env!("CARGO_PKG_VERSION"));

    let service = ScreenwatchService::new(config)?;
    service.start().await?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    service.shutdown().await;

    Ok(())
}
