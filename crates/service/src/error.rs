use thiserror::Error;

use courtside_core::CourtsideError;
use courtside_queue::QueueError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] CourtsideError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("inbox watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
