//! # Stream Replicator
//!
//! Replicates a table's change stream into a copy of the table in another
//! region, without echoing replicated writes back to their origin.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          ReplicationHandler                               │
//! │                                                                           │
//! │  ┌───────────┐    ┌────────────────┐    ┌────────────────────────────┐    │
//! │  │ normalize │───►│ RequestBuilder │───►│ RetryController            │    │
//! │  │ (filter,  │    │ (newest first, │    │ (split, conflict waves,    │    │
//! │  │  sort)    │    │  loop guard,   │    │  bulkhead, backoff,        │    │
//! │  └───────────┘    │  provenance)   │    │  deadline)                 │    │
//! │                   └────────────────┘    └─────────────┬──────────────┘    │
//! │                                                       ▼                   │
//! │                                         ┌────────────────────────────┐    │
//! │                                         │ BatchWriter ─► BatchWrite- │    │
//! │                                         │                Store       │    │
//! │                                         └────────────────────────────┘    │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! 1. **At-least-once**: a batch is either fully applied or the invocation
//!    fails with [`ReplicationError::DeadlineExceeded`] and is re-delivered.
//! 2. **Newest wins per key**: the latest observed write for a key is the
//!    last one applied at the target.
//! 3. **No loops**: writes that carry the target's own provenance tag are
//!    never written back.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stream_replicator::{MemoryStore, ReplicationConfig, ReplicationHandler};
//!
//! # async fn run(payload: &str) -> stream_replicator::Result<()> {
//! let config = ReplicationConfig::from_env()?;
//! let handler = ReplicationHandler::new(config, Arc::new(MemoryStore::new(["id"])))?;
//! let summary = handler.handle_json(payload).await?;
//! println!("handled {} records", summary.handled);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod coordinator;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod error;
pub mod handler;
pub mod locator;
pub mod metrics;
pub mod normalize;
pub mod reconcile;
pub mod record;
pub mod request;
pub mod resilience;
pub mod store;
pub mod writer;

// Re-exports for convenience
pub use batch::{split_into_batches, Batch};
pub use config::{ReplicationConfig, ReplicationSettings};
pub use coordinator::{ControllerState, ReplicationSummary, RetryController};
pub use error::{ReplicationError, Result};
pub use handler::ReplicationHandler;
pub use locator::StreamLocator;
pub use reconcile::{ReconcileReport, ReconcileStore, Reconciler};
pub use record::{AttributeValue, ChangeRecord, EventKind, Item, SequenceNumber, StreamEvent};
pub use request::{KeyedRequest, RequestBuilder, WriteRequest};
pub use store::{BatchWriteStore, MemoryStore, StoreError};
pub use writer::{BatchOutcome, BatchWriter};

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoStore;
