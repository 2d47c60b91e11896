// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request builder: change records to keyed write requests.
//!
//! # Loop prevention
//!
//! Every replicated item carries a provenance tag naming the region and
//! table it was first written to. When a table replicates into a peer that
//! replicates back, the peer's stream delivers our own writes again; those
//! records carry a tag equal to the target config and are skipped.
//!
//! ```text
//! Orders@us-east-1 ──put {tag: us-east-1/Orders}──▶ Orders@eu-west-1
//!        ▲                                                │
//!        └──── stream record {tag: us-east-1/Orders} ─────┘
//!                 target == tag  →  dropped
//! ```
//!
//! Deletes carry no image and are always propagated.
//!
//! # Ordering
//!
//! Records are walked newest-first, so for a key written several times in
//! one invocation the newest request comes first in the output.

use crate::config::ReplicationConfig;
use crate::error::Result;
use crate::locator::StreamLocator;
use crate::metrics;
use crate::record::{AttributeValue, ChangeRecord, EventKind, Item};
use tracing::{trace, warn};

/// Item attribute recording the region a replicated item originated in.
pub const SOURCE_REGION_ATTR: &str = "_repl_source_region";
/// Item attribute recording the table a replicated item originated in.
pub const SOURCE_TABLE_ATTR: &str = "_repl_source_table";

/// A single entry of a bulk write call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteRequest {
    Put { item: Item },
    Delete { key: Item },
}

impl WriteRequest {
    pub fn is_put(&self) -> bool {
        matches!(self, WriteRequest::Put { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, WriteRequest::Delete { .. })
    }
}

/// A write request paired with the primary key it affects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyedRequest {
    pub key: Item,
    pub request: WriteRequest,
}

impl KeyedRequest {
    pub fn put(key: Item, item: Item) -> Self {
        Self {
            key,
            request: WriteRequest::Put { item },
        }
    }

    pub fn delete(key: Item) -> Self {
        Self {
            request: WriteRequest::Delete { key: key.clone() },
            key,
        }
    }

    /// Check whether a request returned by the store refers to this entry.
    ///
    /// Matches on key identity: a delete by its key, a put when every key
    /// attribute appears in the returned item with the same value. Within
    /// a batch keys are unique, so this identifies at most one entry.
    pub fn matches(&self, returned: &WriteRequest) -> bool {
        match (&self.request, returned) {
            (WriteRequest::Delete { .. }, WriteRequest::Delete { key }) => *key == self.key,
            (WriteRequest::Put { .. }, WriteRequest::Put { item }) => {
                !self.key.is_empty()
                    && self.key.iter().all(|(name, value)| item.get(name) == Some(value))
            }
            _ => false,
        }
    }
}

/// Provenance tag read from an item image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceTag {
    pub source_region: String,
    pub source_table: String,
}

impl ProvenanceTag {
    /// Read the tag, if the image carries one.
    pub fn from_item(item: &Item) -> Option<Self> {
        let region = item.get(SOURCE_REGION_ATTR)?.as_s()?;
        let table = item.get(SOURCE_TABLE_ATTR)?.as_s()?;
        Some(Self {
            source_region: region.to_string(),
            source_table: table.to_string(),
        })
    }

    /// Write the tag into an image.
    pub fn stamp(&self, item: &mut Item) {
        item.insert(
            SOURCE_REGION_ATTR.to_string(),
            AttributeValue::S(self.source_region.clone()),
        );
        item.insert(
            SOURCE_TABLE_ATTR.to_string(),
            AttributeValue::S(self.source_table.clone()),
        );
    }
}

/// Maps normalized change records to keyed write requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: ReplicationConfig,
}

impl RequestBuilder {
    pub fn new(config: &ReplicationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Lazily build requests, newest record first.
    ///
    /// Skipped records produce nothing. A malformed locator yields an
    /// `Err` item; callers must stop at the first one.
    pub fn build<'r>(
        &'r self,
        records: &'r [ChangeRecord],
    ) -> impl Iterator<Item = Result<KeyedRequest>> + 'r {
        records
            .iter()
            .rev()
            .filter_map(move |record| self.build_one(record).transpose())
    }

    /// Build every request up front, failing on the first malformed locator.
    pub fn build_all(&self, records: &[ChangeRecord]) -> Result<Vec<KeyedRequest>> {
        let requests = self.build(records).collect::<Result<Vec<_>>>()?;
        metrics::record_requests_built(&self.config.target_table, requests.len());
        Ok(requests)
    }

    /// Map one record to at most one request.
    pub fn build_one(&self, record: &ChangeRecord) -> Result<Option<KeyedRequest>> {
        let image = match (record.event_kind, &record.new_image) {
            // Deletes always propagate, even when they are our own reflection.
            // An insert followed by a delete can race with the peer's copy.
            (EventKind::Remove, _) => {
                return Ok(Some(KeyedRequest::delete(record.key.clone())));
            }
            (_, Some(image)) => image,
            (kind, None) => {
                warn!(
                    sequence_number = %record.sequence_number,
                    ?kind,
                    "Change record has no new image, skipping"
                );
                return Ok(None);
            }
        };

        let existing = ProvenanceTag::from_item(image);
        if let Some(tag) = &existing {
            if self
                .config
                .is_own_reflection(&tag.source_region, &tag.source_table)
            {
                trace!(
                    sequence_number = %record.sequence_number,
                    "Skipping reflected write"
                );
                metrics::record_loop_skipped(&self.config.target_table);
                return Ok(None);
            }
        }

        let origin = StreamLocator::parse(&record.source_locator)?;

        let mut item = image.clone();
        if existing.is_none() {
            ProvenanceTag {
                source_region: origin.region,
                source_table: origin.table,
            }
            .stamp(&mut item);
        }

        Ok(Some(KeyedRequest::put(record.key.clone(), item)))
    }
}
