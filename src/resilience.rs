//! Resilience utilities: deadline-bounded backoff and bulkheads.
//!
//! - [`BackoffPolicy`]: Linear backoff clamped to an invocation deadline
//! - [`Bulkhead`]: Semaphore to limit concurrent batch writes

use crate::config::ReplicationSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

// =============================================================================
// Backoff
// =============================================================================

/// Linear backoff bounded by a wall-clock deadline.
///
/// # Backoff Schedule (defaults)
///
/// ```text
/// Attempt  Delay     Cumulative
/// -------  -----     ----------
/// 1        5s        5s
/// 2        10s       15s
/// 3        15s       30s
/// ...
/// 9        45s       225s
/// 10       20s       245s  (clamped to the deadline)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay added per attempt.
    pub base: Duration,

    /// Total budget from the start of the invocation.
    pub budget: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, budget: Duration) -> Self {
        Self { base, budget }
    }

    /// Backoff policy for the configured settings.
    pub fn from_settings(settings: &ReplicationSettings) -> Self {
        Self::new(settings.backoff_base(), settings.deadline())
    }

    /// Unclamped delay after the given attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt.max(1))
    }

    /// Delay after `attempt`, clamped so the sleep ends no later than the
    /// deadline.
    pub fn delay_before_deadline(&self, attempt: u32, deadline: Instant, now: Instant) -> Duration {
        self.delay_for_attempt(attempt)
            .min(deadline.saturating_duration_since(now))
    }

    /// Deadline for an invocation that started at `start`.
    pub fn deadline_from(&self, start: Instant) -> Instant {
        start + self.budget
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&ReplicationSettings::default())
    }
}

// =============================================================================
// Bulkhead
// =============================================================================

/// The bulkhead's semaphore was closed while a writer waited on it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bulkhead closed with {limit} write slots")]
pub struct BulkheadClosed {
    pub limit: usize,
}

/// Bounds the number of bulk write calls in flight.
///
/// Clones share slots, so one bulkhead covers every writer task of a round.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    slots: Arc<Semaphore>,
    limit: usize,
}

impl Bulkhead {
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a write slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, BulkheadClosed> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| BulkheadClosed { limit: self.limit })
    }

    /// Stop handing out slots. Waiting and later writers get [`BulkheadClosed`].
    pub fn close(&self) {
        self.slots.close();
    }

    /// Write calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.slots.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
