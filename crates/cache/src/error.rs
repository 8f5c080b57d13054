//! Cache and upstream error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache store unavailable: {0}")]
    Store(String),
}
