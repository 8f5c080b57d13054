//! results-worker: ingests uploaded match results and keeps the weather cache warm.
//!
//! Watches an inbox directory for results files, admits them through the
//! bounded channel and processes them on a worker pool. With
//! `WEATHER_API_URL` set, the current forecast is refreshed into the cache
//! on the configured interval.
//!
//! # Usage
//!
//! ```bash
//! results-worker --inbox /srv/uploads --staging-dir /var/tmp/courtside
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use courtside_cache::{CacheStore, MemoryCache, UpstreamSource, WeatherResult};
use courtside_core::config::load_dotenv;
use courtside_core::Config;
use courtside_service::{HttpForecastClient, Inbox, ResultsFileProcessor, ResultsService};

// ── CLI ─────────────────────────────────────────────────────────────

/// Courtside results worker.
#[derive(Parser, Debug)]
#[command(name = "results-worker", version, about)]
struct Cli {
    /// Directory watched for uploaded results files.
    #[arg(long, env = "RESULTS_INBOX_DIR")]
    inbox: Option<PathBuf>,

    /// Directory uploads are moved to before processing.
    #[arg(long, env = "RESULTS_STAGING_DIR")]
    staging_dir: Option<PathBuf>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.staging_dir {
        config.results.staging_dir = dir;
    }
    config.log_summary();

    let cache: Arc<dyn CacheStore<WeatherResult>> =
        Arc::new(MemoryCache::new(config.weather.cache_capacity));
    let forecast: Option<Arc<dyn UpstreamSource<WeatherResult>>> = match &config.weather.api_url {
        Some(url) => {
            let client: Arc<dyn UpstreamSource<WeatherResult>> = Arc::new(HttpForecastClient::new(url.clone())?);
            Some(client)
        }
        None => None,
    };

    let service = ResultsService::start(&config, Arc::new(ResultsFileProcessor::new()), forecast, cache)?;

    let inbox = match cli.inbox {
        Some(dir) => Some(Inbox::watch(
            dir,
            config.results.staging_dir.clone(),
            service.gateway(),
            service.cancel_token(),
        )?),
        None => {
            info!("no inbox configured, accepting submissions from the library API only");
            None
        }
    };

    info!("results-worker running");
    shutdown_signal().await?;
    info!("shutdown signal received");

    if let Some(inbox) = inbox {
        inbox.stop().await;
    }
    let report = service.shutdown().await;
    info!(report = %serde_json::to_string(&report)?, "results-worker exited cleanly");

    Ok(())
}

// ── Signal handling ─────────────────────────────────────────────────

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = sigterm.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
