// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch splitter for keyed write requests.
//!
//! Groups requests into bulk write calls the store will accept: at most
//! [`MAX_BATCH_WRITE_ITEMS`] entries, and never two entries for the same
//! key (the store rejects such calls outright).
//!
//! # Design
//!
//! ```text
//! requests ──▶ current batch ──┬── full (25)?         ──▶ emit, start new
//!                              ├── key already in it? ──▶ emit, start new
//!                              └── otherwise push
//! ```
//!
//! A single forward pass. Input order is preserved, so for a key written
//! several times the first (newest) request lands in the earliest batch.

use crate::config::MAX_BATCH_WRITE_ITEMS;
use crate::record::Item;
use crate::request::{KeyedRequest, WriteRequest};
use std::collections::HashSet;

/// Requests submitted together in one bulk write call.
///
/// Invariant: `len() <= max size` and keys are pairwise distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<KeyedRequest>,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Number of requests in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether an entry for this key is already present.
    pub fn contains_key(&self, key: &Item) -> bool {
        self.entries.iter().any(|e| &e.key == key)
    }

    /// Iterate over the keys in the batch.
    pub fn keys(&self) -> impl Iterator<Item = &Item> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Borrow the keyed entries.
    pub fn entries(&self) -> &[KeyedRequest] {
        &self.entries
    }

    /// Request payloads, in batch order.
    pub fn requests(&self) -> Vec<WriteRequest> {
        self.entries.iter().map(|e| e.request.clone()).collect()
    }

    /// Take back the keyed entries.
    pub fn into_entries(self) -> Vec<KeyedRequest> {
        self.entries
    }
}

/// Lazy iterator of batches over a request sequence.
///
/// Created by [`split_into_batches`].
#[derive(Debug)]
pub struct Batches<I> {
    requests: I,
    max_size: usize,
    current: Batch,
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = KeyedRequest>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        for request in self.requests.by_ref() {
            let must_close = self.current.len() >= self.max_size
                || self.current.contains_key(&request.key);

            if must_close {
                let full = std::mem::replace(
                    &mut self.current,
                    Batch::with_capacity(self.max_size),
                );
                self.current.entries.push(request);
                return Some(full);
            }
            self.current.entries.push(request);
        }

        // Input exhausted: emit the trailing partial batch once.
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

/// Split requests into store-compliant batches.
///
/// `max_size` is clamped to `1..=MAX_BATCH_WRITE_ITEMS`. An empty input
/// yields no batches.
pub fn split_into_batches<I>(requests: I, max_size: usize) -> Batches<I::IntoIter>
where
    I: IntoIterator<Item = KeyedRequest>,
{
    let max_size = max_size.clamp(1, MAX_BATCH_WRITE_ITEMS);
    Batches {
        requests: requests.into_iter(),
        max_size,
        current: Batch::with_capacity(max_size),
    }
}

/// Check the batch invariants: size bound and key uniqueness.
pub fn is_valid_batch(batch: &Batch, max_size: usize) -> bool {
    let mut seen = HashSet::with_capacity(batch.len());
    batch.len() <= max_size && batch.keys().all(|k| seen.insert(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AttributeValue;

    fn key(id: &str) -> Item {
        Item::from([("pk".to_string(), AttributeValue::S(id.to_string()))])
    }

    fn put(id: &str, v: &str) -> KeyedRequest {
        let mut item = key(id);
        item.insert("v".to_string(), AttributeValue::N(v.to_string()));
        KeyedRequest::put(key(id), item)
    }

    fn sizes(batches: &[Batch]) -> Vec<usize> {
        batches.iter().map(Batch::len).collect()
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let batches: Vec<_> = split_into_batches(Vec::new(), 25).collect();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_splits_at_25() {
        let requests: Vec<_> = (0..60).map(|i| put(&format!("k{i}"), "1")).collect();
        let batches: Vec<_> = split_into_batches(requests, 25).collect();
        assert_eq!(sizes(&batches), vec![25, 25, 10]);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_batch() {
        let requests: Vec<_> = (0..50).map(|i| put(&format!("k{i}"), "1")).collect();
        let batches: Vec<_> = split_into_batches(requests, 25).collect();
        assert_eq!(sizes(&batches), vec![25, 25]);
    }

    #[test]
    fn test_duplicate_key_closes_batch() {
        let requests = vec![put("a", "3"), put("b", "1"), put("a", "2"), put("c", "1")];
        let batches: Vec<_> = split_into_batches(requests, 25).collect();

        assert_eq!(sizes(&batches), vec![2, 2]);
        assert_eq!(batches[0].entries()[0], put("a", "3"));
        assert_eq!(batches[1].entries()[0], put("a", "2"));
    }

    #[test]
    fn test_same_key_repeated() {
        let requests = vec![put("a", "3"), put("a", "2"), put("a", "1")];
        let batches: Vec<_> = split_into_batches(requests, 25).collect();
        assert_eq!(sizes(&batches), vec![1, 1, 1]);
    }

    #[test]
    fn test_delete_and_put_same_key_split() {
        let requests = vec![KeyedRequest::delete(key("a")), put("a", "1")];
        let batches: Vec<_> = split_into_batches(requests, 25).collect();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].entries()[0].request.is_delete());
    }

    #[test]
    fn test_max_size_clamped() {
        let requests: Vec<_> = (0..30).map(|i| put(&format!("k{i}"), "1")).collect();
        let batches: Vec<_> = split_into_batches(requests.clone(), 100).collect();
        assert_eq!(sizes(&batches), vec![25, 5]);

        let batches: Vec<_> = split_into_batches(requests, 0).collect();
        assert_eq!(batches.len(), 30);
    }

    #[test]
    fn test_lazy_split() {
        let requests = (0..1000).map(|i| put(&format!("k{i}"), "1"));
        let mut batches = split_into_batches(requests, 10);
        assert_eq!(batches.next().map(|b| b.len()), Some(10));
    }

    #[test]
    fn test_is_valid_batch() {
        let batch = split_into_batches(vec![put("a", "1"), put("b", "1")], 25)
            .next()
            .unwrap();
        assert!(is_valid_batch(&batch, 25));
        assert!(!is_valid_batch(&batch, 1));

        let bad = Batch {
            entries: vec![put("a", "1"), put("a", "2")],
        };
        assert!(!is_valid_batch(&bad, 25));
    }

    #[test]
    fn test_batch_accessors() {
        let batch = split_into_batches(vec![put("a", "1"), KeyedRequest::delete(key("b"))], 25)
            .next()
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert!(batch.contains_key(&key("b")));
        assert!(!batch.contains_key(&key("c")));
        assert_eq!(batch.requests().len(), 2);
        assert_eq!(batch.into_entries().len(), 2);
    }
}
