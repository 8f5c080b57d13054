//! Background task that keeps a day-bucketed cache entry warm.
//!
//! Each tick fetches the subject from upstream and writes it under
//! [`cache_key`]. Fetch and store errors are logged and the loop carries on;
//! only cancellation ends it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use courtside_core::CancellationToken;

use crate::error::CacheError;
use crate::key::cache_key;
use crate::store::CacheStore;

/// Interval used when the TTL is too short to refresh one minute early.
pub const FALLBACK_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

// ── Schedule ────────────────────────────────────────────────────────

/// How long entries live and how often they are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
}

impl RefreshSchedule {
    pub fn new(cache_ttl: Duration, refresh_interval: Duration) -> Self {
        Self {
            cache_ttl,
            refresh_interval,
        }
    }

    /// Cache for `mins` minutes and refresh one minute before expiry.
    ///
    /// With `mins <= 1` the refresh falls back to every 30 seconds. Values
    /// too large to express in seconds saturate.
    pub fn from_minutes(mins: u64) -> Self {
        let refresh_interval = if mins > 1 {
            Duration::from_secs((mins - 1).saturating_mul(60))
        } else {
            FALLBACK_REFRESH_INTERVAL
        };
        Self::new(Duration::from_secs(mins.saturating_mul(60)), refresh_interval)
    }
}

// ── Upstream seam ───────────────────────────────────────────────────

/// Where refreshed values come from.
#[async_trait]
pub trait UpstreamSource<V>: Send + Sync {
    /// `Ok(None)` means upstream has nothing for `subject` right now.
    async fn fetch(&self, subject: &str, cancel: &CancellationToken) -> Result<Option<V>, CacheError>;
}

/// Wall-clock source used for bucket keys.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of a single refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Cached { key: String },
    NoData,
    Failed(String),
    Cancelled,
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cached { key } => write!(f, "cached as {key}"),
            Self::NoData => write!(f, "no data"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ── Refresher ───────────────────────────────────────────────────────

pub struct PeriodicRefresher<V> {
    subject: String,
    key_prefix: String,
    schedule: RefreshSchedule,
    source: Arc<dyn UpstreamSource<V>>,
    store: Arc<dyn CacheStore<V>>,
    clock: Clock,
}

impl<V: Send + Sync + 'static> PeriodicRefresher<V> {
    pub fn new(
        subject: impl Into<String>,
        key_prefix: impl Into<String>,
        schedule: RefreshSchedule,
        source: Arc<dyn UpstreamSource<V>>,
        store: Arc<dyn CacheStore<V>>,
    ) -> Self {
        Self {
            subject: subject.into(),
            key_prefix: key_prefix.into(),
            schedule,
            source,
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for bucket keys.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn schedule(&self) -> RefreshSchedule {
        self.schedule
    }

    /// Key the next successful tick would write.
    pub fn current_key(&self) -> String {
        cache_key(&self.key_prefix, &self.subject, (self.clock)())
    }

    /// Fetch once and write the result. Never issues a write once `cancel` fired.
    pub async fn tick(&self, cancel: &CancellationToken) -> TickOutcome {
        if cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TickOutcome::Cancelled,
            fetched = self.source.fetch(&self.subject, cancel) => fetched,
        };

        let value = match fetched {
            Ok(Some(value)) => value,
            Ok(None) => {
                info!(subject = %self.subject, "no data from upstream, nothing cached");
                return TickOutcome::NoData;
            }
            Err(e) => {
                warn!(subject = %self.subject, error = %e, "upstream fetch failed");
                return TickOutcome::Failed(e.to_string());
            }
        };

        if cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }

        let key = self.current_key();
        match self.store.set(&key, value, self.schedule.cache_ttl).await {
            Ok(()) => {
                info!(
                    subject = %self.subject,
                    key = %key,
                    ttl_secs = self.schedule.cache_ttl.as_secs(),
                    "cached refreshed value"
                );
                TickOutcome::Cached { key }
            }
            Err(e) => {
                warn!(subject = %self.subject, key = %key, error = %e, "cache write failed");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tick, sleep `refresh_interval`, repeat until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            subject = %self.subject,
            interval_secs = self.schedule.refresh_interval.as_secs(),
            ttl_secs = self.schedule.cache_ttl.as_secs(),
            "refresher started"
        );
        let mut ticks: u64 = 0;

        while !cancel.is_cancelled() {
            let outcome = self.tick(&cancel).await;
            if outcome == TickOutcome::Cancelled {
                break;
            }
            ticks += 1;
            debug!(subject = %self.subject, tick = ticks, outcome = %outcome, "refresh tick finished");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.schedule.refresh_interval) => {}
            }
        }

        info!(subject = %self.subject, ticks = ticks, "refresher stopped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────
