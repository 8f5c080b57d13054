//! Wires the admission pipeline and the weather refresher into one service.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use courtside_cache::{
    CacheStore, PeriodicRefresher, RefreshSchedule, UpstreamSource, WeatherResult, WEATHER_KEY_PREFIX,
};
use courtside_core::time::deadline_after;
use courtside_core::{CancellationSource, CancellationToken, Config};
use courtside_queue::{
    AdmissionChannel, IngestionPool, IngestionStats, ResultProcessor, StagedFile, StagedResource,
    StatsSnapshot, SubmissionGateway,
};

use crate::error::ServiceError;

/// What happened during [`ResultsService::shutdown`].
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// Queued uploads that were never processed and got released.
    pub leftovers_released: usize,
    /// Whether every task stopped within the shutdown timeout. When it is
    /// `false`, uploads held by aborted workers show up in `stats.abandoned`.
    pub clean: bool,
    pub stats: StatsSnapshot,
}

/// A running results-ingestion service.
pub struct ResultsService {
    cancel: CancellationSource,
    channel: Arc<AdmissionChannel<StagedFile>>,
    gateway: SubmissionGateway<StagedFile>,
    stats: Arc<IngestionStats>,
    pool: IngestionPool,
    refresher: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl ResultsService {
    /// Validate `config` and spawn the worker pool and, when a forecast
    /// source is given, the weather refresher.
    pub fn start(
        config: &Config,
        processor: Arc<dyn ResultProcessor<StagedFile>>,
        forecast: Option<Arc<dyn UpstreamSource<WeatherResult>>>,
        cache: Arc<dyn CacheStore<WeatherResult>>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        let cancel = CancellationSource::new();
        let stats = Arc::new(IngestionStats::new());
        let channel = Arc::new(AdmissionChannel::<StagedFile>::new(config.results.channel_capacity)?);

        let gateway = SubmissionGateway::new(channel.clone(), stats.clone())
            .with_admission_timeout(config.results.admission_timeout());

        let pool = IngestionPool::spawn(
            config.results.workers,
            channel.clone(),
            processor,
            stats.clone(),
            config.results.processing_timeout(),
            &cancel.token(),
        );

        let refresher = match forecast {
            Some(source) => {
                let refresher = PeriodicRefresher::new(
                    config.weather.city.clone(),
                    WEATHER_KEY_PREFIX,
                    RefreshSchedule::from_minutes(config.weather.mins_to_cache),
                    source,
                    cache,
                );
                let token = cancel.token();
                Some(tokio::spawn(async move { refresher.run(token).await }))
            }
            None => {
                info!("no forecast source configured, weather refresh disabled");
                None
            }
        };

        info!(
            capacity = config.results.channel_capacity,
            workers = pool.len(),
            admission_timeout_ms = gateway.admission_timeout().as_millis() as u64,
            "results service started"
        );

        Ok(Self {
            cancel,
            channel,
            gateway,
            stats,
            pool,
            refresher,
            shutdown_timeout: config.runtime.shutdown_timeout(),
        })
    }

    /// A handle for submitting staged uploads.
    pub fn gateway(&self) -> SubmissionGateway<StagedFile> {
        self.gateway.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Token that fires when shutdown begins.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.token()
    }

    /// Items queued plus items being processed.
    pub fn in_flight(&self) -> usize {
        self.channel.in_flight()
    }

    /// Stop all tasks and release anything still queued.
    pub async fn shutdown(self) -> ShutdownReport {
        info!("results service shutting down");
        self.cancel.cancel();
        self.channel.close();

        let deadline = deadline_after(self.shutdown_timeout);
        let mut clean = self.pool.join_timeout(self.shutdown_timeout).await;

        if let Some(mut handle) = self.refresher {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "refresher task failed"),
                Err(_) => {
                    warn!("refresher did not stop in time, aborting");
                    handle.abort();
                    clean = false;
                }
            }
        }

        let leftovers = self.channel.drain();
        let leftovers_released = leftovers.len();
        for item in leftovers {
            match item.resource().release().await {
                Ok(()) => self.stats.record_released(),
                Err(e) => {
                    self.stats.record_release_failure();
                    warn!(resource = %item.resource(), error = %e, "failed to release queued upload on shutdown");
                }
            }
        }

        let report = ShutdownReport {
            leftovers_released,
            clean,
            stats: self.stats.snapshot(),
        };
        info!(
            leftovers = report.leftovers_released,
            clean = report.clean,
            processed = report.stats.processed,
            failed = report.stats.failed,
            abandoned = report.stats.abandoned,
            "results service stopped"
        );
        report
    }
}
