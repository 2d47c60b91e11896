// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Target store integration traits.
//!
//! Defines the bulk-write primitive the replicator drives. A call takes up
//! to 25 heterogeneous put/delete requests for one table, applies each
//! atomically but not the call as a whole, and returns the requests it
//! could not apply under its own throughput limits.
//!
//! # Example
//!
//! ```rust,no_run
//! use stream_replicator::store::{BatchWriteStore, BoxFuture};
//! use stream_replicator::request::WriteRequest;
//!
//! struct MyBackend { /* ... */ }
//!
//! impl BatchWriteStore for MyBackend {
//!     fn batch_write(&self, _table: &str, _requests: Vec<WriteRequest>) -> BoxFuture<'_, Vec<WriteRequest>> {
//!         Box::pin(async move { Ok(Vec::new()) })
//!     }
//! }
//! ```

use crate::record::{AttributeValue, Item};
use crate::request::WriteRequest;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Simplified error for store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Trait defining what we need from the target store.
///
/// Implementations must be cheap to share between concurrent batch writers.
pub trait BatchWriteStore: Send + Sync + 'static {
    /// Submit one bulk write call.
    ///
    /// Returns the subset of `requests` the store did not apply. An `Err`
    /// means the call did not complete normally and nothing can be assumed
    /// about which requests were applied.
    fn batch_write(&self, table: &str, requests: Vec<WriteRequest>)
        -> BoxFuture<'_, Vec<WriteRequest>>;
}

/// In-process store with upsert/delete semantics.
///
/// Items are addressed by the attributes named in the key schema. Used by
/// tests and local runs; it never reports unprocessed items.
#[derive(Debug)]
pub struct MemoryStore {
    key_schema: Vec<String>,
    tables: Mutex<HashMap<String, BTreeMap<Item, Item>>>,
}

impl MemoryStore {
    /// Create a store whose primary key is made of `key_schema` attributes.
    pub fn new<I, S>(key_schema: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_schema: key_schema.into_iter().map(Into::into).collect(),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Project an item onto the key schema.
    pub fn key_of(&self, item: &Item) -> StoreResult<Item> {
        self.key_schema
            .iter()
            .map(|name| {
                item.get(name)
                    .cloned()
                    .map(|v| (name.clone(), v))
                    .ok_or_else(|| StoreError(format!("missing key attribute {name}")))
            })
            .collect()
    }

    /// Apply requests in order, validating the bulk call constraints.
    pub fn apply(&self, table: &str, requests: &[WriteRequest]) -> StoreResult<()> {
        if requests.len() > crate::config::MAX_BATCH_WRITE_ITEMS {
            return Err(StoreError(format!(
                "too many items in batch: {}",
                requests.len()
            )));
        }

        let keys = requests
            .iter()
            .map(|r| match r {
                WriteRequest::Put { item } => self.key_of(item),
                WriteRequest::Delete { key } => self.key_of(key),
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut distinct = keys.clone();
        distinct.sort();
        distinct.dedup();
        if distinct.len() != keys.len() {
            return Err(StoreError(
                "provided list of item keys contains duplicates".to_string(),
            ));
        }

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError("store lock poisoned".to_string()))?;
        let rows = tables.entry(table.to_string()).or_default();
        for (key, request) in keys.into_iter().zip(requests) {
            match request {
                WriteRequest::Put { item } => {
                    rows.insert(key, item.clone());
                }
                WriteRequest::Delete { .. } => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Fetch an item by key.
    pub fn get(&self, table: &str, key: &Item) -> Option<Item> {
        let tables = self.tables.lock().ok()?;
        tables.get(table)?.get(key).cloned()
    }

    /// Snapshot of a table's contents, ordered by key.
    pub fn snapshot(&self, table: &str) -> BTreeMap<Item, Item> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.get(table).cloned())
            .unwrap_or_default()
    }

    /// Number of items in a table.
    pub fn len(&self, table: &str) -> usize {
        self.snapshot(table).len()
    }

    /// Insert an item directly, bypassing batch validation.
    pub fn seed(&self, table: &str, item: Item) -> StoreResult<()> {
        let key = self.key_of(&item)?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError("store lock poisoned".to_string()))?;
        tables.entry(table.to_string()).or_default().insert(key, item);
        Ok(())
    }

    /// Set one attribute on an existing or new item.
    pub fn set_attribute(
        &self,
        table: &str,
        key: &Item,
        name: &str,
        value: AttributeValue,
    ) -> StoreResult<()> {
        let key = self.key_of(key)?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError("store lock poisoned".to_string()))?;
        let item = tables
            .entry(table.to_string())
            .or_default()
            .entry(key.clone())
            .or_insert(key);
        item.insert(name.to_string(), value);
        Ok(())
    }
}

impl BatchWriteStore for MemoryStore {
    fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> BoxFuture<'_, Vec<WriteRequest>> {
        let result = self.apply(table, &requests).map(|()| Vec::new());
        Box::pin(async move { result })
    }
}
