// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry controller.
//!
//! Drives rounds of concurrent batch writes until every request is applied
//! or the invocation deadline passes.
//!
//! # Round loop
//!
//! 1. Split the pending requests into batches and plan conflict waves
//! 2. Write all batches through the bulkhead, wait for every write
//! 3. No failures: converged
//! 4. Deadline reached: fail with the unresolved count
//! 5. Otherwise sleep `min(base * attempt, deadline - now)` and go to 1
//!    with the failures as the new pending set
//!
//! The deadline is only checked between rounds. A round that is already in
//! flight is never cancelled, so a slow round can overrun the ceiling.

mod dispatch;
mod types;

pub use dispatch::{plan_waves, run_round};
pub use types::{ControllerState, ReplicationSummary, RoundStats};

use crate::batch::split_into_batches;
use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::request::KeyedRequest;
use crate::resilience::{BackoffPolicy, Bulkhead};
use crate::store::BatchWriteStore;
use crate::writer::BatchWriter;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Orchestrates retry rounds for one invocation.
pub struct RetryController<S: BatchWriteStore> {
    writer: BatchWriter<S>,
    bulkhead: Bulkhead,
    backoff: BackoffPolicy,
    max_batch_size: usize,
    state: ControllerState,
    rounds: Vec<RoundStats>,
}

impl<S: BatchWriteStore> RetryController<S> {
    /// Create a controller writing to the config's target table.
    pub fn new(config: &ReplicationConfig, store: Arc<S>) -> Self {
        let settings = &config.settings;
        Self {
            writer: BatchWriter::new(store, config.target_table.clone()),
            bulkhead: Bulkhead::new(settings.max_concurrency),
            backoff: BackoffPolicy::from_settings(settings),
            max_batch_size: settings.max_batch_size,
            state: ControllerState::Running,
            rounds: Vec::new(),
        }
    }

    /// Get current controller state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Per-round statistics so far.
    pub fn rounds(&self) -> &[RoundStats] {
        &self.rounds
    }

    /// Run rounds until convergence or deadline, counting from `start`.
    ///
    /// `total` is the number of records the requests were built from and is
    /// reported in the outcome.
    #[instrument(skip_all, fields(table = %self.writer.table(), requests = requests.len()))]
    pub async fn run(
        &mut self,
        requests: Vec<KeyedRequest>,
        total: usize,
        start: Instant,
    ) -> Result<ReplicationSummary> {
        let request_count = requests.len();
        let deadline = self.backoff.deadline_from(start);
        let mut pending = requests;
        let mut attempt: u32 = 0;
        self.state = ControllerState::Running;

        loop {
            attempt += 1;

            let batches: Vec<_> = split_into_batches(pending, self.max_batch_size).collect();
            let batch_count = batches.len();
            let waves = plan_waves(batches);
            let wave_count = waves.len();
            metrics::record_round(self.writer.table(), attempt, batch_count);

            let failures = run_round(&self.writer, &self.bulkhead, waves).await;
            self.rounds.push(RoundStats {
                attempt,
                batches: batch_count,
                waves: wave_count,
                failed: failures.len(),
            });
            debug!(
                attempt,
                batches = batch_count,
                waves = wave_count,
                failed = failures.len(),
                "Round complete"
            );

            if failures.is_empty() {
                self.state = ControllerState::Converged;
                return Ok(ReplicationSummary {
                    handled: total,
                    requests: request_count,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                self.state = ControllerState::DeadlineExceeded;
                warn!(
                    attempt,
                    unresolved = failures.len(),
                    total,
                    "Deadline reached with unresolved requests"
                );
                return Err(ReplicationError::DeadlineExceeded {
                    unresolved: failures.len(),
                    total,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }

            let delay = self.backoff.delay_before_deadline(attempt, deadline, now);
            info!(
                attempt,
                failed = failures.len(),
                delay_ms = delay.as_millis() as u64,
                "Failure sending write batch, waiting and retrying"
            );
            metrics::record_backoff(self.writer.table(), delay);
            tokio::time::sleep(delay).await;

            pending = failures;
        }
    }
}
