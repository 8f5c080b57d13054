//! Deadline arithmetic that never overflows.

use std::time::Duration;

use tokio::time::Instant;

/// Stand-in for "no deadline", roughly 30 years out.
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + limit`, clamped to [`FAR_FUTURE`] when the sum does not fit.
pub fn deadline_from(start: Instant, limit: Duration) -> Instant {
    start
        .checked_add(limit)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Deadline `limit` from now.
pub fn deadline_after(limit: Duration) -> Instant {
    deadline_from(Instant::now(), limit)
}
