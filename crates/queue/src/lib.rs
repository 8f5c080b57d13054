pub mod channel;
pub mod error;
pub mod gateway;
pub mod staged;
pub mod stats;
pub mod worker;

pub use channel::{AdmissionChannel, EnqueueFailure, Rejected, WorkItem};
pub use error::QueueError;
pub use gateway::{AdmissionOutcome, SubmissionGateway, DEFAULT_ADMISSION_TIMEOUT};
pub use staged::{ReleaseGuard, StagedFile, StagedResource};
pub use stats::{IngestionStats, StatsSnapshot};
pub use worker::{IngestionPool, IngestionWorker, ProcessReport, ResultProcessor};
