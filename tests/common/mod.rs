//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Mock BatchWriteStore with scripted and randomized responses
//! - Change record and event helpers

pub mod mock_store;

pub use mock_store::*;

use stream_replicator::record::{
    AttributeValue, EventKind, Item, RawRecord, SequenceNumber, StreamEvent, StreamPayload,
};

/// Locator of the source table used throughout the tests.
pub const ORDERS_ARN: &str = "arn:aws:dynamodb:us-east-1:123:table/Orders/stream/2024";

/// Primary key `{id: S}`.
pub fn key(id: &str) -> Item {
    Item::from([("id".to_string(), AttributeValue::S(id.to_string()))])
}

/// Item with key `id` and attribute `v`.
pub fn image(id: &str, v: &str) -> Item {
    let mut item = key(id);
    item.insert("v".to_string(), AttributeValue::S(v.to_string()));
    item
}

/// Raw stream record for an insert or modify.
pub fn upsert(seq: u64, id: &str, v: &str) -> RawRecord {
    upsert_image(seq, id, image(id, v))
}

/// Raw stream record carrying an explicit image.
pub fn upsert_image(seq: u64, id: &str, new_image: Item) -> RawRecord {
    RawRecord {
        event_name: Some(EventKind::Modify),
        event_source_arn: ORDERS_ARN.to_string(),
        dynamodb: Some(StreamPayload {
            sequence_number: SequenceNumber::new(seq.to_string()),
            keys: key(id),
            new_image: Some(new_image),
        }),
    }
}

/// Raw stream record for a removal.
pub fn remove(seq: u64, id: &str) -> RawRecord {
    RawRecord {
        event_name: Some(EventKind::Remove),
        event_source_arn: ORDERS_ARN.to_string(),
        dynamodb: Some(StreamPayload {
            sequence_number: SequenceNumber::new(seq.to_string()),
            keys: key(id),
            new_image: None,
        }),
    }
}

/// Wrap records in an invocation envelope.
pub fn event(records: Vec<RawRecord>) -> StreamEvent {
    StreamEvent { records }
}
