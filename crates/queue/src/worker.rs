//! Consumer loops draining the admission channel.
//!
//! Each [`IngestionWorker`] pulls one item at a time, hands it to the
//! [`ResultProcessor`], then releases the staged resource whatever the
//! outcome. A failing item is logged and counted; the loop moves on. A worker
//! aborted mid-item still gets its resource released by a [`ReleaseGuard`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use courtside_core::time::deadline_after;
use courtside_core::CancellationToken;

use crate::channel::{AdmissionChannel, WorkItem};
use crate::error::QueueError;
use crate::staged::{ReleaseGuard, StagedResource};
use crate::stats::IngestionStats;

// ── Processing seam ─────────────────────────────────────────────────

/// Summary returned by a successful processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// Result records the processor accepted.
    pub records: u64,
}

/// The results-processing function applied to each admitted resource.
#[async_trait]
pub trait ResultProcessor<R>: Send + Sync {
    async fn process(&self, resource: &R, cancel: &CancellationToken) -> anyhow::Result<ProcessReport>;
}

// ── Worker ──────────────────────────────────────────────────────────

/// A single consumer loop.
pub struct IngestionWorker<R> {
    name: String,
    channel: Arc<AdmissionChannel<R>>,
    processor: Arc<dyn ResultProcessor<R>>,
    stats: Arc<IngestionStats>,
    processing_timeout: Option<Duration>,
}

impl<R: StagedResource> IngestionWorker<R> {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<AdmissionChannel<R>>,
        processor: Arc<dyn ResultProcessor<R>>,
        stats: Arc<IngestionStats>,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            processor,
            stats,
            processing_timeout: None,
        }
    }

    /// Bound every processing call (default: unbounded).
    pub fn with_processing_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drain the channel until `cancel` fires or the channel closes empty.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker = %self.name, "ingestion worker started");
        let mut processed: u64 = 0;
        let mut failed: u64 = 0;

        while let Some(item) = self.channel.dequeue(&cancel).await {
            // Outcomes are logged and counted inside `handle`.
            match self.handle(item, &cancel).await {
                Ok(_) => processed += 1,
                Err(_) => failed += 1,
            }
        }

        info!(worker = %self.name, processed = processed, failed = failed, "ingestion worker stopped");
    }

    /// Process one item and release its resource. Never panics on item failure.
    pub async fn handle(
        &self,
        item: WorkItem<R>,
        cancel: &CancellationToken,
    ) -> Result<ProcessReport, QueueError> {
        let resource = item.resource();
        let guard = ReleaseGuard::new(resource.clone(), self.stats.clone());
        let started = Instant::now();
        let queued_ms = (chrono::Utc::now() - item.enqueued_at()).num_milliseconds().max(0);
        debug!(worker = %self.name, seq = item.seq(), resource = %resource, queued_ms = queued_ms, "processing results file");

        let outcome = match self.processing_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.processor.process(resource, cancel)).await {
                    Ok(result) => result.map_err(|e| processing_error(resource, e)),
                    Err(_) => Err(QueueError::ProcessingTimeout(limit)),
                }
            }
            None => self
                .processor
                .process(resource, cancel)
                .await
                .map_err(|e| processing_error(resource, e)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(report) => {
                self.stats.record_processed();
                info!(
                    worker = %self.name,
                    seq = item.seq(),
                    resource = %resource,
                    records = report.records,
                    elapsed_ms = elapsed_ms,
                    "results file processed"
                );
            }
            Err(e) => {
                self.stats.record_failed();
                warn!(
                    worker = %self.name,
                    seq = item.seq(),
                    resource = %resource,
                    error = %e,
                    elapsed_ms = elapsed_ms,
                    "results file could not be processed"
                );
            }
        }

        match resource.release().await {
            Ok(()) => self.stats.record_released(),
            Err(e) => {
                self.stats.record_release_failure();
                warn!(worker = %self.name, resource = %resource, error = %e, "failed to release staged file");
            }
        }
        guard.disarm();

        // Dropping the item here frees its capacity slot.
        drop(item);
        outcome
    }
}

fn processing_error<R: std::fmt::Display>(resource: &R, error: anyhow::Error) -> QueueError {
    QueueError::Processing {
        resource: resource.to_string(),
        reason: format!("{error:#}"),
    }
}

// ── Pool ────────────────────────────────────────────────────────────

/// A fixed set of workers sharing one channel.
pub struct IngestionPool {
    handles: Vec<JoinHandle<()>>,
}

impl IngestionPool {
    /// Spawn `size` workers onto the current runtime.
    pub fn spawn<R: StagedResource>(
        size: usize,
        channel: Arc<AdmissionChannel<R>>,
        processor: Arc<dyn ResultProcessor<R>>,
        stats: Arc<IngestionStats>,
        processing_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Self {
        let handles = (0..size.max(1))
            .map(|i| {
                let worker = IngestionWorker::new(
                    format!("ingestion-{i}"),
                    channel.clone(),
                    processor.clone(),
                    stats.clone(),
                )
                .with_processing_timeout(processing_timeout);
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(cancel).await })
            })
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to return.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "ingestion worker task failed");
            }
        }
    }

    /// Wait up to `limit` for every worker, aborting stragglers.
    ///
    /// Items held by aborted workers are released in the background and
    /// counted as abandoned. Returns `false` when the limit was hit.
    pub async fn join_timeout(self, limit: Duration) -> bool {
        let deadline = deadline_after(limit);
        let mut aborted = Vec::new();
        for mut handle in self.handles {
            if !aborted.is_empty() {
                handle.abort();
                aborted.push(handle);
                continue;
            }
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "ingestion worker task failed"),
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "ingestion workers did not stop in time, aborting");
                    handle.abort();
                    aborted.push(handle);
                }
            }
        }

        let in_time = aborted.is_empty();
        // Let aborted tasks unwind so their guards have fired on return.
        for handle in aborted {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "ingestion worker task failed");
                }
            }
        }
        in_time
    }

    /// Abort workers that are still running.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
