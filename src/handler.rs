// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Invocation handler.
//!
//! Entry point for one batch of change events:
//!
//! ```text
//! StreamEvent ──▶ normalize ──▶ RequestBuilder::build_all ──▶ RetryController::run
//!                 (filter,       (loop prevention,             (split, write,
//!                  sort)          provenance, fail-fast)        retry, deadline)
//! ```
//!
//! Every request is built before the first store call, so a malformed
//! locator aborts the invocation with nothing written.

use crate::config::ReplicationConfig;
use crate::coordinator::{ReplicationSummary, RetryController};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::normalize::normalize;
use crate::record::StreamEvent;
use crate::request::RequestBuilder;
use crate::store::BatchWriteStore;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, instrument};

/// Replicates change-stream batches into the configured target table.
pub struct ReplicationHandler<S: BatchWriteStore> {
    config: ReplicationConfig,
    store: Arc<S>,
}

impl<S: BatchWriteStore> ReplicationHandler<S> {
    /// Create a handler, validating the config.
    pub fn new(config: ReplicationConfig, store: Arc<S>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    /// Get the handler's config.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Get a reference to the target store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decode a JSON envelope and handle it.
    pub async fn handle_json(&self, payload: &str) -> Result<ReplicationSummary> {
        let event = StreamEvent::from_json(payload)?;
        self.handle(event).await
    }

    /// Replicate one batch of change events.
    #[instrument(
        skip_all,
        fields(
            target_region = %self.config.target_region,
            target_table = %self.config.target_table,
        )
    )]
    pub async fn handle(&self, event: StreamEvent) -> Result<ReplicationSummary> {
        let start = Instant::now();
        let table = self.config.target_table.as_str();

        let received = event.records.len();
        let records = normalize(event.records);
        metrics::record_records_received(table, received, records.len());

        if records.is_empty() {
            info!(received, "No change records to replicate");
            return Ok(ReplicationSummary {
                handled: 0,
                requests: 0,
                attempts: 0,
                elapsed: start.elapsed(),
            });
        }

        let total = records.len();
        let requests = match RequestBuilder::new(&self.config).build_all(&records) {
            Ok(requests) => requests,
            Err(e) => {
                error!(error = %e, total, "Aborting invocation before any write");
                metrics::record_invocation(table, "malformed", total, start.elapsed());
                return Err(e);
            }
        };

        let mut controller = RetryController::new(&self.config, Arc::clone(&self.store));
        match controller.run(requests, total, start).await {
            Ok(summary) => {
                info!(
                    handled = summary.handled,
                    requests = summary.requests,
                    attempts = summary.attempts,
                    elapsed_sec = summary.elapsed.as_secs_f64(),
                    "Handled {} records in {:.3} sec",
                    summary.handled,
                    summary.elapsed.as_secs_f64()
                );
                metrics::record_invocation(table, "converged", total, summary.elapsed);
                Ok(summary)
            }
            Err(e) => {
                if let ReplicationError::DeadlineExceeded { unresolved, .. } = &e {
                    error!(unresolved, total, "Replication did not converge before deadline");
                }
                metrics::record_invocation(table, "deadline_exceeded", total, start.elapsed());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AttributeValue, Item};
    use crate::request::{SOURCE_REGION_ATTR, SOURCE_TABLE_ATTR};
    use crate::store::MemoryStore;

    const EVENT: &str = r#"{
        "Records": [
            {
                "eventName": "INSERT",
                "eventSourceARN": "arn:aws:dynamodb:us-east-1:123:table/Orders/stream/2024",
                "dynamodb": {
                    "SequenceNumber": "100",
                    "Keys": {"id": {"S": "o-1"}},
                    "NewImage": {"id": {"S": "o-1"}, "total": {"N": "10"}}
                }
            },
            {
                "eventName": "MODIFY",
                "eventSourceARN": "arn:aws:dynamodb:us-east-1:123:table/Orders/stream/2024",
                "dynamodb": {
                    "SequenceNumber": "101",
                    "Keys": {"id": {"S": "o-1"}},
                    "NewImage": {"id": {"S": "o-1"}, "total": {"N": "12"}}
                }
            },
            {"eventName": "INSERT", "eventSourceARN": "arn:aws:sqs:us-east-1:123:queue"}
        ]
    }"#;

    fn key(id: &str) -> Item {
        Item::from([("id".to_string(), AttributeValue::S(id.to_string()))])
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_json_replicates_latest_state() {
        let store = Arc::new(MemoryStore::new(["id"]));
        let handler = ReplicationHandler::new(
            ReplicationConfig::for_testing("eu-west-1", "Orders"),
            Arc::clone(&store),
        )
        .unwrap();

        let summary = handler.handle_json(EVENT).await.unwrap();
        assert_eq!(summary.handled, 2);
        assert_eq!(summary.requests, 2);

        let item = store.get("Orders", &key("o-1")).unwrap();
        assert_eq!(item["total"], AttributeValue::N("12".into()));
        assert_eq!(item[SOURCE_REGION_ATTR], AttributeValue::S("us-east-1".into()));
        assert_eq!(item[SOURCE_TABLE_ATTR], AttributeValue::S("Orders".into()));
    }

    #[tokio::test]
    async fn test_empty_event_short_circuits() {
        let store = Arc::new(MemoryStore::new(["id"]));
        let handler = ReplicationHandler::new(
            ReplicationConfig::for_testing("eu-west-1", "Orders"),
            store,
        )
        .unwrap();

        let summary = handler.handle(StreamEvent::default()).await.unwrap();
        assert_eq!(summary.handled, 0);
        assert_eq!(summary.attempts, 0);
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let store = Arc::new(MemoryStore::new(["id"]));
        let handler = ReplicationHandler::new(
            ReplicationConfig::for_testing("eu-west-1", "Orders"),
            store,
        )
        .unwrap();

        let err = handler.handle_json("{\"Records\": 5}").await.unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidEvent(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new(["id"]));
        assert!(ReplicationHandler::new(ReplicationConfig::new("", "Orders"), store).is_err());
    }
}
