//! Bounded FIFO admission channel with deadline-aware enqueue.
//!
//! Capacity is modelled as slot permits on a semaphore. A producer must win a
//! slot before its item is queued, and the slot travels with the item until
//! the consuming worker drops it, so the bound covers queued *and* in-flight
//! work. Producers that lose the race against their deadline or cancellation
//! get their item back untouched.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;

use courtside_core::CancellationToken;

use crate::error::QueueError;

// ── Items ───────────────────────────────────────────────────────────

/// A resource admitted into the channel.
///
/// Holds one capacity slot for as long as it is alive.
pub struct WorkItem<T> {
    seq: u64,
    enqueued_at: DateTime<Utc>,
    resource: T,
    _slot: OwnedSemaphorePermit,
}

impl<T> WorkItem<T> {
    /// Admission order, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn resource(&self) -> &T {
        &self.resource
    }
}

impl<T: fmt::Debug> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("seq", &self.seq)
            .field("enqueued_at", &self.enqueued_at)
            .field("resource", &self.resource)
            .finish()
    }
}

/// Why an enqueue attempt did not place its item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueFailure {
    /// The deadline passed before a slot freed up.
    TimedOut,
    /// The caller's token fired first.
    Cancelled,
    /// The channel was closed.
    Closed,
    /// No free slot for a non-blocking attempt.
    Full,
}

/// A refused item, handed back to the producer with the reason.
#[derive(Debug)]
pub struct Rejected<T> {
    pub item: T,
    pub reason: EnqueueFailure,
}

impl<T> Rejected<T> {
    fn new(item: T, reason: EnqueueFailure) -> Self {
        Self { item, reason }
    }
}

// ── Channel ─────────────────────────────────────────────────────────

struct State<T> {
    queue: VecDeque<WorkItem<T>>,
    closed: bool,
}

/// Thread- and task-safe bounded queue shared by producers and consumers.
pub struct AdmissionChannel<T> {
    capacity: usize,
    slots: Arc<Semaphore>,
    state: Mutex<State<T>>,
    item_ready: Notify,
    next_seq: AtomicU64,
}

impl<T: Send> AdmissionChannel<T> {
    /// Create a channel that holds at most `capacity` items in flight.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(QueueError::InvalidCapacity {
                requested: capacity,
                max: Semaphore::MAX_PERMITS,
            });
        }
        Ok(Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            item_ready: Notify::new(),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Place `item` in the queue, waiting for a free slot until `deadline`.
    ///
    /// Returns the admission sequence number. On failure nothing was queued
    /// and the item is returned inside [`Rejected`].
    pub async fn enqueue(
        &self,
        item: T,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<u64, Rejected<T>> {
        if cancel.is_cancelled() {
            return Err(Rejected::new(item, EnqueueFailure::Cancelled));
        }

        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Rejected::new(item, EnqueueFailure::Cancelled));
            }
            acquired = self.slots.clone().acquire_owned() => match acquired {
                Ok(slot) => slot,
                Err(_) => return Err(Rejected::new(item, EnqueueFailure::Closed)),
            },
            _ = tokio::time::sleep_until(deadline) => {
                return Err(Rejected::new(item, EnqueueFailure::TimedOut));
            }
        };

        self.push(item, slot)
    }

    /// Place `item` only if a slot is free right now.
    pub fn try_enqueue(&self, item: T) -> Result<u64, Rejected<T>> {
        match self.slots.clone().try_acquire_owned() {
            Ok(slot) => self.push(item, slot),
            Err(TryAcquireError::NoPermits) => Err(Rejected::new(item, EnqueueFailure::Full)),
            Err(TryAcquireError::Closed) => Err(Rejected::new(item, EnqueueFailure::Closed)),
        }
    }

    fn push(&self, item: T, slot: OwnedSemaphorePermit) -> Result<u64, Rejected<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(Rejected::new(item, EnqueueFailure::Closed));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        state.queue.push_back(WorkItem {
            seq,
            enqueued_at: Utc::now(),
            resource: item,
            _slot: slot,
        });
        drop(state);

        self.item_ready.notify_one();
        Ok(seq)
    }

    /// Take the oldest item, waiting until one arrives.
    ///
    /// Returns `None` once `cancel` fires, or when the channel is closed and
    /// nothing is left to hand out.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<WorkItem<T>> {
        loop {
            let notified = self.item_ready.notified();
            tokio::pin!(notified);
            // Register before inspecting the queue so a push in between is not missed.
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return None;
            }
            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Close the channel.
    ///
    /// Producers blocked in [`enqueue`](Self::enqueue) are released with
    /// [`EnqueueFailure::Closed`]; queued items stay available to consumers.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);

        self.slots.close();
        self.item_ready.notify_waiters();
    }

    /// Remove everything still queued. Used on shutdown to release leftovers.
    pub fn drain(&self) -> Vec<WorkItem<T>> {
        self.lock().queue.drain(..).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items queued plus items dequeued but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // The critical sections never panic, so a poisoned lock still holds a consistent queue.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> fmt::Debug for AdmissionChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionChannel")
            .field("capacity", &self.capacity)
            .field("available_slots", &self.slots.available_permits())
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
