//! Lock-free counters for the admission and ingestion path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by the gateway and every ingestion worker.
#[derive(Debug, Default)]
pub struct IngestionStats {
    admitted: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    released: AtomicU64,
    release_failures: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`IngestionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub processed: u64,
    pub failed: u64,
    pub released: u64,
    pub release_failures: u64,
    /// Resources whose owner was dropped before releasing them; they are
    /// released in the background.
    pub abandoned: u64,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release_failure(&self) {
        self.release_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Submissions that never made it into the channel.
    pub fn refused(&self) -> u64 {
        self.timed_out + self.cancelled + self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = IngestionStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_record_and_snapshot() {
        let stats = IngestionStats::new();
        stats.record_admitted();
        stats.record_admitted();
        stats.record_timed_out();
        stats.record_rejected();
        stats.record_processed();
        stats.record_failed();
        stats.record_released();

        let snap = stats.snapshot();
        assert_eq!(snap.admitted, 2);
        assert_eq!(snap.timed_out, 1);
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.refused(), 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = IngestionStats::new();
        stats.record_cancelled();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["cancelled"], 1);
        assert_eq!(json["release_failures"], 0);
    }
}
