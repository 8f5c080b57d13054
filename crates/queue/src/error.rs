//! Queue error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("admission timed out after {0:?}")]
    AdmissionTimeout(Duration),

    #[error("admission cancelled by caller")]
    AdmissionCancelled,

    #[error("admission channel is shut down")]
    ChannelShutdown,

    #[error("processing failed for {resource}: {reason}")]
    Processing { resource: String, reason: String },

    #[error("processing exceeded {0:?}")]
    ProcessingTimeout(Duration),

    #[error("failed to release {resource}: {source}")]
    Release {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("channel capacity must be between 1 and {max}, got {requested}")]
    InvalidCapacity { requested: usize, max: usize },
}

impl QueueError {
    /// Whether the caller may simply submit again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AdmissionTimeout(_) | Self::AdmissionCancelled)
    }
}
