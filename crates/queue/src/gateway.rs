//! Boundary between an upload request and the admission channel.
//!
//! The gateway owns the admission timeout. Whatever does not get admitted is
//! released here, so a caller never has to clean up after a failed submit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use courtside_core::time::deadline_from;
use courtside_core::CancellationToken;

use crate::channel::{AdmissionChannel, EnqueueFailure};
use crate::error::QueueError;
use crate::staged::{ReleaseGuard, StagedResource};
use crate::stats::IngestionStats;

/// Default bound on how long a submission waits for a free slot.
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(3);

/// What happened to a submitted resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Queued; the pipeline now owns the resource.
    Admitted,
    /// The channel stayed full past the admission timeout.
    TimedOut,
    /// The caller's own cancellation fired first.
    Cancelled,
    /// The channel refused the item (shutting down).
    Rejected(String),
}

impl AdmissionOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// Backpressure outcomes the caller may retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Cancelled)
    }

    /// Map a failed admission onto the queue error taxonomy.
    pub fn into_result(self, admission_timeout: Duration) -> Result<(), QueueError> {
        match self {
            Self::Admitted => Ok(()),
            Self::TimedOut => Err(QueueError::AdmissionTimeout(admission_timeout)),
            Self::Cancelled => Err(QueueError::AdmissionCancelled),
            Self::Rejected(_) => Err(QueueError::ChannelShutdown),
        }
    }
}

impl fmt::Display for AdmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admitted => write!(f, "admitted"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

/// Accepts staged resources and tries to admit them within a deadline.
pub struct SubmissionGateway<R> {
    channel: Arc<AdmissionChannel<R>>,
    admission_timeout: Duration,
    stats: Arc<IngestionStats>,
}

impl<R> Clone for SubmissionGateway<R> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            admission_timeout: self.admission_timeout,
            stats: self.stats.clone(),
        }
    }
}

impl<R: StagedResource> SubmissionGateway<R> {
    pub fn new(channel: Arc<AdmissionChannel<R>>, stats: Arc<IngestionStats>) -> Self {
        Self {
            channel,
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
            stats,
        }
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    pub fn admission_timeout(&self) -> Duration {
        self.admission_timeout
    }

    /// Try to admit `resource`, racing the admission timeout against `parent`.
    ///
    /// On anything but [`AdmissionOutcome::Admitted`] the resource has already
    /// been released when this returns. If the returned future is dropped
    /// while waiting, the resource is released in the background.
    pub async fn submit(&self, resource: R, parent: &CancellationToken) -> AdmissionOutcome {
        let started = Instant::now();
        let deadline = deadline_from(started, self.admission_timeout);
        let label = resource.to_string();
        let guard = ReleaseGuard::new(resource.clone(), self.stats.clone());

        let enqueued = self.channel.enqueue(resource, deadline, parent).await;
        guard.disarm();

        let rejected = match enqueued {
            Ok(seq) => {
                self.stats.record_admitted();
                info!(
                    resource = %label,
                    seq = seq,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "results file admitted for processing"
                );
                return AdmissionOutcome::Admitted;
            }
            Err(rejected) => rejected,
        };

        let outcome = match rejected.reason {
            EnqueueFailure::TimedOut | EnqueueFailure::Full => {
                self.stats.record_timed_out();
                warn!(
                    resource = %label,
                    timeout_ms = self.admission_timeout.as_millis() as u64,
                    "uploading the results file took too long and was cancelled"
                );
                AdmissionOutcome::TimedOut
            }
            EnqueueFailure::Cancelled => {
                self.stats.record_cancelled();
                warn!(resource = %label, "results upload cancelled by the caller before admission");
                AdmissionOutcome::Cancelled
            }
            EnqueueFailure::Closed => {
                self.stats.record_rejected();
                warn!(resource = %label, "results upload rejected, channel is shutting down");
                AdmissionOutcome::Rejected(QueueError::ChannelShutdown.to_string())
            }
        };

        match rejected.item.release().await {
            Ok(()) => self.stats.record_released(),
            Err(e) => {
                self.stats.record_release_failure();
                warn!(resource = %label, error = %e, "failed to clean up rejected upload");
            }
        }

        info!(
            resource = %label,
            outcome = %outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "results submission finished"
        );
        outcome
    }
}
