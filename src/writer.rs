// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch writer: one bulk write call per batch.
//!
//! Reports which entries of a batch were not applied. It never retries;
//! the retry controller re-feeds failures into the next round.
//!
//! | Store response | Failed entries |
//! |----------------|----------------|
//! | `Ok([])` | none |
//! | `Ok(unprocessed)` | entries matching an unprocessed item |
//! | `Err(_)` | the whole batch |

use crate::batch::Batch;
use crate::metrics;
use crate::request::KeyedRequest;
use crate::store::BatchWriteStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Why entries of a batch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The store applied the call but returned these entries as unprocessed.
    Unprocessed,
    /// The call errored; nothing can be assumed about the batch.
    CallFailed(String),
}

impl FailureCause {
    fn label(&self) -> &'static str {
        match self {
            FailureCause::Unprocessed => "unprocessed",
            FailureCause::CallFailed(_) => "error",
        }
    }
}

/// Result of writing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of entries submitted.
    pub submitted: usize,
    /// Entries to retry.
    pub failed: Vec<KeyedRequest>,
    /// Set when `failed` is non-empty.
    pub cause: Option<FailureCause>,
}

impl BatchOutcome {
    /// Check if every entry was applied.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Executes batches against the target table.
pub struct BatchWriter<S: BatchWriteStore> {
    store: Arc<S>,
    table: String,
}

impl<S: BatchWriteStore> Clone for BatchWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
        }
    }
}

impl<S: BatchWriteStore> BatchWriter<S> {
    /// Create a writer for `table`.
    pub fn new(store: Arc<S>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Get the target table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Submit one batch and collect the entries that did not succeed.
    pub async fn write(&self, batch: Batch) -> BatchOutcome {
        let submitted = batch.len();
        if submitted == 0 {
            return BatchOutcome::default();
        }

        let start = Instant::now();
        let result = self.store.batch_write(&self.table, batch.requests()).await;
        metrics::record_batch_write(&self.table, submitted, start.elapsed());

        let outcome = match result {
            Ok(unprocessed) if unprocessed.is_empty() => BatchOutcome {
                submitted,
                ..Default::default()
            },
            Ok(unprocessed) => {
                let entries = batch.into_entries();
                let failed: Vec<KeyedRequest> = entries
                    .into_iter()
                    .filter(|entry| unprocessed.iter().any(|u| entry.matches(u)))
                    .collect();

                if failed.len() != unprocessed.len() {
                    warn!(
                        table = %self.table,
                        unprocessed = unprocessed.len(),
                        matched = failed.len(),
                        "Unprocessed items did not all match a submitted request"
                    );
                    metrics::record_unmatched_unprocessed(
                        &self.table,
                        unprocessed.len().saturating_sub(failed.len()),
                    );
                }

                debug!(
                    table = %self.table,
                    submitted,
                    unprocessed = failed.len(),
                    "Batch partially applied"
                );
                let cause = (!failed.is_empty()).then_some(FailureCause::Unprocessed);
                BatchOutcome {
                    submitted,
                    failed,
                    cause,
                }
            }
            Err(e) => {
                warn!(
                    table = %self.table,
                    submitted,
                    error = %e,
                    "Error writing batch, assuming all entries failed"
                );
                BatchOutcome {
                    submitted,
                    failed: batch.into_entries(),
                    cause: Some(FailureCause::CallFailed(e.to_string())),
                }
            }
        };

        if let Some(cause) = &outcome.cause {
            metrics::record_batch_failure(&self.table, cause.label(), outcome.failed.len());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::split_into_batches;
    use crate::record::{AttributeValue, Item};
    use crate::request::WriteRequest;
    use crate::store::{BoxFuture, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that replays a fixed response and counts calls.
    struct ScriptedStore {
        response: Result<Vec<WriteRequest>, StoreError>,
        calls: AtomicUsize,
    }

    impl ScriptedStore {
        fn new(response: Result<Vec<WriteRequest>, StoreError>) -> Self {
            Self {
                response,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl BatchWriteStore for ScriptedStore {
        fn batch_write(
            &self,
            _table: &str,
            _requests: Vec<WriteRequest>,
        ) -> BoxFuture<'_, Vec<WriteRequest>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn key(id: &str) -> Item {
        Item::from([("id".to_string(), AttributeValue::S(id.to_string()))])
    }

    fn put(id: &str) -> KeyedRequest {
        let mut item = key(id);
        item.insert("payload".to_string(), AttributeValue::N("1".to_string()));
        KeyedRequest::put(key(id), item)
    }

    fn batch(requests: Vec<KeyedRequest>) -> Batch {
        split_into_batches(requests, 25).next().unwrap()
    }

    #[tokio::test]
    async fn test_all_processed() {
        let store = Arc::new(ScriptedStore::new(Ok(Vec::new())));
        let writer = BatchWriter::new(Arc::clone(&store), "Orders");

        let outcome = writer.write(batch(vec![put("a"), put("b")])).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.submitted, 2);
        assert_eq!(outcome.cause, None);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unprocessed_matched_back() {
        let unprocessed = vec![put("b").request, WriteRequest::Delete { key: key("c") }];
        let store = Arc::new(ScriptedStore::new(Ok(unprocessed)));
        let writer = BatchWriter::new(store, "Orders");

        let outcome = writer
            .write(batch(vec![put("a"), put("b"), KeyedRequest::delete(key("c"))]))
            .await;
        assert_eq!(outcome.failed, vec![put("b"), KeyedRequest::delete(key("c"))]);
        assert_eq!(outcome.cause, Some(FailureCause::Unprocessed));
    }

    #[tokio::test]
    async fn test_unprocessed_put_with_reencoded_attributes() {
        // Store echoes the item back with a differently encoded number.
        let mut echoed = key("a");
        echoed.insert("payload".to_string(), AttributeValue::N("1.0".to_string()));
        let store = Arc::new(ScriptedStore::new(Ok(vec![WriteRequest::Put { item: echoed }])));
        let writer = BatchWriter::new(store, "Orders");

        let outcome = writer.write(batch(vec![put("a"), put("b")])).await;
        assert_eq!(outcome.failed, vec![put("a")]);
    }

    #[tokio::test]
    async fn test_unmatched_unprocessed_ignored() {
        let store = Arc::new(ScriptedStore::new(Ok(vec![put("zzz").request])));
        let writer = BatchWriter::new(store, "Orders");

        let outcome = writer.write(batch(vec![put("a")])).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.cause, None);
    }

    #[tokio::test]
    async fn test_call_error_fails_whole_batch() {
        let store = Arc::new(ScriptedStore::new(Err(StoreError::new("throttled"))));
        let writer = BatchWriter::new(store, "Orders");

        let requests = vec![put("a"), put("b"), put("c")];
        let outcome = writer.write(batch(requests.clone())).await;
        assert_eq!(outcome.failed, requests);
        assert_eq!(
            outcome.cause,
            Some(FailureCause::CallFailed("throttled".to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_batch_skips_store() {
        let store = Arc::new(ScriptedStore::new(Ok(Vec::new())));
        let writer = BatchWriter::new(Arc::clone(&store), "Orders");

        let outcome = writer.write(Batch::default()).await;
        assert!(outcome.is_success());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
