// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One-time reconciliation between a primary and a secondary table.
//!
//! Replication only carries changes made after it was enabled. To bring an
//! existing pair of tables in line, every primary item is touched with a
//! marker attribute so the stream replicates it, then secondary items that
//! did not receive that marker are touched so they replicate back.
//!
//! ```text
//! primary:    scan keys ──▶ set _sync = T on each
//!                                 │ settle (20s)
//!                                 ▼
//! secondary:  scan keys where _sync <> T ──▶ set _sync = T' on each
//! ```

use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::record::{AttributeValue, Item};
use crate::store::{BoxFuture, MemoryStore};
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument};

/// Marker attribute written by the reconciler.
pub const SYNC_MARKER_ATTR: &str = "_sync";

/// Default pause between stamping the primary and scanning the secondary.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(20);

/// Which items a key scan returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    /// Every item.
    All,
    /// Items whose marker is absent or differs from the value.
    MarkerNotEqual(i64),
}

impl KeyFilter {
    /// Check an item against the filter.
    pub fn accepts(&self, item: &Item) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::MarkerNotEqual(value) => {
                item.get(SYNC_MARKER_ATTR) != Some(&marker_value(*value))
            }
        }
    }
}

/// One page of a key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPage {
    pub keys: Vec<Item>,
    /// Resume point for the next page; `None` on the last page.
    pub next: Option<Item>,
}

/// What the reconciler needs from a table.
pub trait ReconcileStore: Send + Sync + 'static {
    /// Scan one page of primary keys, resuming after `start`.
    fn scan_keys(
        &self,
        table: &str,
        filter: KeyFilter,
        start: Option<Item>,
    ) -> BoxFuture<'_, KeyPage>;

    /// Set the marker attribute on the item with `key`.
    fn set_marker(&self, table: &str, key: Item, value: i64) -> BoxFuture<'_, ()>;
}

/// Page size of [`MemoryStore`] key scans.
const MEMORY_SCAN_PAGE: usize = 100;

impl ReconcileStore for MemoryStore {
    fn scan_keys(
        &self,
        table: &str,
        filter: KeyFilter,
        start: Option<Item>,
    ) -> BoxFuture<'_, KeyPage> {
        let rows = self.snapshot(table);
        let lower = match start {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut range = rows.range((lower, Bound::Unbounded));
        let mut keys = Vec::new();
        let mut last = None;
        for (key, item) in range.by_ref().take(MEMORY_SCAN_PAGE) {
            if filter.accepts(item) {
                keys.push(key.clone());
            }
            last = Some(key.clone());
        }

        let page = KeyPage {
            keys,
            next: range.next().and(last),
        };
        Box::pin(async move { Ok(page) })
    }

    fn set_marker(&self, table: &str, key: Item, value: i64) -> BoxFuture<'_, ()> {
        let result = self.set_attribute(table, &key, SYNC_MARKER_ATTR, marker_value(value));
        Box::pin(async move { result })
    }
}

/// Counts of items stamped on each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub primary_stamped: usize,
    pub secondary_stamped: usize,
}

/// Reconciles one table between two stores.
pub struct Reconciler<P: ReconcileStore, S: ReconcileStore> {
    primary: Arc<P>,
    secondary: Arc<S>,
    table: String,
    settle: Duration,
}

impl<P: ReconcileStore, S: ReconcileStore> Reconciler<P, S> {
    pub fn new(primary: Arc<P>, secondary: Arc<S>, table: impl Into<String>) -> Self {
        Self {
            primary,
            secondary,
            table: table.into(),
            settle: DEFAULT_SETTLE,
        }
    }

    /// Override the settle interval.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Stamp the primary, wait, then stamp the secondary's stragglers.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn run(&self) -> Result<ReconcileReport> {
        let marker = unix_now()?;
        let primary_keys = collect_keys(&*self.primary, &self.table, KeyFilter::All).await?;
        let primary_stamped =
            stamp_all(&*self.primary, &self.table, primary_keys, marker).await?;
        metrics::record_reconcile_stamped(&self.table, "primary", primary_stamped);
        info!(primary_stamped, marker, "Primary stamped, pausing for sync to complete");

        tokio::time::sleep(self.settle).await;

        let stale = collect_keys(
            &*self.secondary,
            &self.table,
            KeyFilter::MarkerNotEqual(marker),
        )
        .await?;
        let secondary_stamped = stamp_all(&*self.secondary, &self.table, stale, unix_now()?).await?;
        metrics::record_reconcile_stamped(&self.table, "secondary", secondary_stamped);
        info!(secondary_stamped, "Secondary stragglers stamped");

        Ok(ReconcileReport {
            primary_stamped,
            secondary_stamped,
        })
    }
}

/// Follow scan pages until the store reports no resume point.
pub async fn collect_keys<T: ReconcileStore + ?Sized>(
    store: &T,
    table: &str,
    filter: KeyFilter,
) -> Result<Vec<Item>> {
    let mut keys = Vec::new();
    let mut start = None;
    loop {
        let page = store
            .scan_keys(table, filter, start)
            .await
            .map_err(|e| ReplicationError::store("scan", e))?;
        keys.extend(page.keys);
        match page.next {
            Some(next) => start = Some(next),
            None => return Ok(keys),
        }
    }
}

async fn stamp_all<T: ReconcileStore + ?Sized>(
    store: &T,
    table: &str,
    keys: Vec<Item>,
    value: i64,
) -> Result<usize> {
    let count = keys.len();
    for key in keys {
        debug!(?key, "Updating");
        store
            .set_marker(table, key, value)
            .await
            .map_err(|e| ReplicationError::store("set_marker", e))?;
    }
    Ok(count)
}

fn marker_value(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn unix_now() -> Result<i64> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ReplicationError::Config(format!("system clock before epoch: {e}")))?
        .as_secs();
    i64::try_from(secs).map_err(|e| ReplicationError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: usize) -> Item {
        Item::from([("id".to_string(), AttributeValue::N(id.to_string()))])
    }

    fn seeded(ids: impl IntoIterator<Item = usize>) -> MemoryStore {
        let store = MemoryStore::new(["id"]);
        for id in ids {
            let mut item = key(id);
            item.insert("v".to_string(), AttributeValue::S(format!("v{id}")));
            store.seed("Orders", item).unwrap();
        }
        store
    }

    /// Mirrors marker writes into a second store, like a live stream would.
    struct Replicating {
        inner: MemoryStore,
        mirror: Arc<MemoryStore>,
    }

    impl ReconcileStore for Replicating {
        fn scan_keys(
            &self,
            table: &str,
            filter: KeyFilter,
            start: Option<Item>,
        ) -> BoxFuture<'_, KeyPage> {
            self.inner.scan_keys(table, filter, start)
        }

        fn set_marker(&self, table: &str, key: Item, value: i64) -> BoxFuture<'_, ()> {
            let mirrored = self
                .mirror
                .set_attribute(table, &key, SYNC_MARKER_ATTR, marker_value(value));
            let result = self
                .inner
                .set_attribute(table, &key, SYNC_MARKER_ATTR, marker_value(value))
                .and(mirrored);
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_memory_scan_paginates() {
        let store = seeded(0..250);
        let first = store.scan_keys("Orders", KeyFilter::All, None).await.unwrap();
        assert_eq!(first.keys.len(), MEMORY_SCAN_PAGE);
        assert!(first.next.is_some());

        let all = collect_keys(&store, "Orders", KeyFilter::All).await.unwrap();
        assert_eq!(all.len(), 250);
    }

    #[tokio::test]
    async fn test_marker_filter() {
        let store = seeded(0..3);
        store.set_marker("Orders", key(1), 42).await.unwrap();

        let stale = collect_keys(&store, "Orders", KeyFilter::MarkerNotEqual(42))
            .await
            .unwrap();
        assert_eq!(stale, vec![key(0), key(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_stamps_secondary_only_items() {
        let secondary = Arc::new(seeded(0..5));
        let primary = Arc::new(Replicating {
            inner: seeded(0..3),
            mirror: Arc::clone(&secondary),
        });

        let report = Reconciler::new(primary, Arc::clone(&secondary), "Orders")
            .run()
            .await
            .unwrap();

        assert_eq!(report.primary_stamped, 3);
        assert_eq!(report.secondary_stamped, 2);
        assert!(secondary
            .snapshot("Orders")
            .values()
            .all(|item| item.contains_key(SYNC_MARKER_ATTR)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_empty_tables() {
        let report = Reconciler::new(
            Arc::new(MemoryStore::new(["id"])),
            Arc::new(MemoryStore::new(["id"])),
            "Orders",
        )
        .with_settle(Duration::from_secs(1))
        .run()
        .await
        .unwrap();
        assert_eq!(report, ReconcileReport::default());
    }
}
