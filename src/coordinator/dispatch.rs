//! Round dispatch: concurrent batch writes behind a bulkhead.
//!
//! Batches sharing a key are never in flight together. A round is grouped
//! into conflict waves; a batch's wave is one past the highest wave of any
//! earlier batch it shares a key with.
//!
//! ```text
//! batches:  B0{a,b}  B1{a,c}  B2{d}  B3{a}
//! waves:    0        1        0      2
//! run:      wave 2: [B3]  →  wave 1: [B1]  →  wave 0: [B0, B2]
//! ```
//!
//! Waves run highest first. The splitter puts the newest request for a key
//! in the earliest batch, so the newest write is applied last and is the
//! one left standing at the target.

use crate::batch::Batch;
use crate::record::Item;
use crate::request::KeyedRequest;
use crate::resilience::Bulkhead;
use crate::store::BatchWriteStore;
use crate::writer::BatchWriter;
use std::collections::{HashMap, HashSet};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Group batches into conflict waves, in execution order.
pub fn plan_waves(batches: Vec<Batch>) -> Vec<Vec<Batch>> {
    let mut last_wave: HashMap<Item, usize> = HashMap::new();
    let mut waves: Vec<Vec<Batch>> = Vec::new();

    for batch in batches {
        let wave = batch
            .keys()
            .filter_map(|k| last_wave.get(k))
            .map(|w| w + 1)
            .max()
            .unwrap_or(0);

        for key in batch.keys() {
            last_wave.insert(key.clone(), wave);
        }
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(batch);
    }

    waves.reverse();
    waves
}

/// Write every batch of a round and gather the requests left to retry.
///
/// Returns once all writes have completed. Failures come back newest first
/// for each key. A failed request whose key a newer request in the same
/// round applied is superseded and dropped.
pub async fn run_round<S: BatchWriteStore>(
    writer: &BatchWriter<S>,
    bulkhead: &Bulkhead,
    waves: Vec<Vec<Batch>>,
) -> Vec<KeyedRequest> {
    // Per executed wave: (failed requests, keys applied).
    let mut results: Vec<(Vec<KeyedRequest>, HashSet<Item>)> = Vec::with_capacity(waves.len());

    for (index, wave) in waves.into_iter().enumerate() {
        debug!(wave = index, batches = wave.len(), "Dispatching wave");
        let mut in_flight: Vec<Option<Batch>> = wave.iter().cloned().map(Some).collect();
        let mut join_set: JoinSet<(usize, Vec<KeyedRequest>)> = JoinSet::new();

        for (slot, batch) in wave.into_iter().enumerate() {
            let writer = writer.clone();
            let bulkhead = bulkhead.clone();
            join_set.spawn(async move {
                // Holding the permit for the whole call bounds in-flight writes.
                let _permit = match bulkhead.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!(
                            error = %e,
                            requests = batch.len(),
                            "Bulkhead closed, batch not written"
                        );
                        return (slot, batch.into_entries());
                    }
                };
                (slot, writer.write(batch).await.failed)
            });
        }

        let mut failed = Vec::new();
        let mut applied = HashSet::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((slot, batch_failed)) => {
                    if let Some(batch) = in_flight.get_mut(slot).and_then(Option::take) {
                        applied.extend(
                            batch
                                .into_entries()
                                .into_iter()
                                .map(|e| e.key)
                                .filter(|k| !batch_failed.iter().any(|f| &f.key == k)),
                        );
                    }
                    failed.extend(batch_failed);
                }
                Err(e) => warn!(error = %e, "Batch writer task failed (JoinError)"),
            }
        }

        // Batches whose task never reported back are retried whole.
        for batch in in_flight.into_iter().flatten() {
            failed.extend(batch.into_entries());
        }
        results.push((failed, applied));
    }

    // Walk from the last executed (newest) wave back to the first.
    let mut failures = Vec::new();
    let mut applied_newer: HashSet<Item> = HashSet::new();
    let mut superseded = 0usize;
    for (failed, applied) in results.into_iter().rev() {
        for request in failed {
            if applied_newer.contains(&request.key) {
                superseded += 1;
            } else {
                failures.push(request);
            }
        }
        applied_newer.extend(applied);
    }
    if superseded > 0 {
        debug!(superseded, "Dropped failed writes overtaken by newer writes");
    }

    failures
}
