//! Pool load and outcome counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::job::OutcomeKind;

/// Point-in-time view of a pool's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Jobs handed to `submit`, accepted or not
    pub submitted: u64,
    /// Jobs waiting in the intake queue
    pub queued: usize,
    /// Jobs currently held by a worker
    pub in_flight: usize,
    /// Jobs that succeeded
    pub succeeded: u64,
    /// Jobs that exhausted their attempts
    pub failed: u64,
    /// Jobs that were cancelled
    pub cancelled: u64,
    /// Jobs rejected at submission (invalid, pool closed, queue full)
    pub rejected: u64,
    /// Handler invocations across all jobs
    pub attempts: u64,
}

impl PoolStats {
    /// Jobs that reached a terminal state
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.cancelled + self.rejected
    }
}

/// Live counters shared by the pool and its workers
///
/// Uses atomic operations for thread-safe access without locks.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    submitted: AtomicU64,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    attempts: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn job_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Counted before the send so a fast worker never sees the queue go negative
    pub(crate) fn job_enqueued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo [`job_enqueued`](Self::job_enqueued) after a failed send
    pub(crate) fn enqueue_aborted(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
    }

    /// A worker took a job off the queue
    pub(crate) fn job_started(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn attempt_started(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal outcome; rejected jobs never count as in flight
    pub(crate) fn job_finished(&self, kind: OutcomeKind) {
        let counter = match kind {
            OutcomeKind::Succeeded => &self.succeeded,
            OutcomeKind::Failed => &self.failed,
            OutcomeKind::Cancelled => &self.cancelled,
            OutcomeKind::InvalidJob | OutcomeKind::PoolClosed | OutcomeKind::QueueFull => {
                &self.rejected
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if !kind.is_rejection() {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}
