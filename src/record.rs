// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-stream record model.
//!
//! Decodes the per-invocation event envelope delivered by the change
//! stream. Attribute values keep the store's typed JSON encoding
//! (`{"S": "abc"}`, `{"N": "42"}`, ...) so items pass through untouched.
//!
//! # Envelope
//!
//! ```json
//! {
//!   "Records": [{
//!     "eventName": "INSERT",
//!     "eventSourceARN": "arn:aws:dynamodb:us-east-1:123:table/Orders/stream/2024",
//!     "dynamodb": {
//!       "SequenceNumber": "111",
//!       "Keys": {"id": {"S": "o-1"}},
//!       "NewImage": {"id": {"S": "o-1"}, "total": {"N": "12"}}
//!     }
//!   }]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::warn;

/// Attribute map: a full item image or a primary key.
pub type Item = BTreeMap<String, AttributeValue>;

/// A typed attribute value in the store's wire encoding.
///
/// Numbers stay in their decimal string form, which keeps equality and
/// hashing exact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    #[serde(rename = "N")]
    N(String),
    /// Base64 text, as delivered by the stream.
    #[serde(rename = "B")]
    B(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "M")]
    M(BTreeMap<String, AttributeValue>),
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(Vec<String>),
}

impl AttributeValue {
    /// String value, if this is an `S` attribute.
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }
}

/// Change kind carried by a stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Insert,
    Modify,
    Remove,
}

impl EventKind {
    /// Parse a wire event name; other event sources use names outside this set.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "INSERT" => Some(EventKind::Insert),
            "MODIFY" => Some(EventKind::Modify),
            "REMOVE" => Some(EventKind::Remove),
            _ => None,
        }
    }
}

/// Decode `eventName` without failing the envelope on names we do not handle.
fn lenient_event_kind<'de, D>(deserializer: D) -> Result<Option<EventKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(name
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(EventKind::from_name))
}

/// Per-shard monotonic stream position.
///
/// Sequence numbers are unbounded decimal strings, so they are compared
/// numerically: fewer significant digits sort first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(pub String);

impl SequenceNumber {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    fn significant(&self) -> &str {
        self.0.trim().trim_start_matches('0')
    }
}

impl Ord for SequenceNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.significant(), other.significant());
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

impl PartialEq for SequenceNumber {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for SequenceNumber {}

impl std::hash::Hash for SequenceNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Change payload of a stream record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamPayload {
    #[serde(default)]
    pub sequence_number: SequenceNumber,
    #[serde(default)]
    pub keys: Item,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Item>,
}

/// One record of the invocation envelope, before normalization.
///
/// Records without a `dynamodb` payload, or whose `eventName` is missing or
/// not a change kind, are not change events and are dropped by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(
        rename = "eventName",
        default,
        deserialize_with = "lenient_event_kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_name: Option<EventKind>,
    #[serde(rename = "eventSourceARN", default)]
    pub event_source_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamodb: Option<StreamPayload>,
}

/// Invocation envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<RawRecord>,
}

impl StreamEvent {
    /// Decode an envelope from JSON.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A normalized change event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub sequence_number: SequenceNumber,
    pub event_kind: EventKind,
    pub key: Item,
    /// Absent for `Remove`.
    pub new_image: Option<Item>,
    pub source_locator: String,
}

impl ChangeRecord {
    /// Convert a raw record that carries a change payload and a known kind.
    pub fn from_raw(raw: RawRecord) -> Option<Self> {
        let payload = raw.dynamodb?;
        let Some(event_kind) = raw.event_name else {
            warn!(
                sequence = %payload.sequence_number.0,
                "Dropping record without a change event name"
            );
            return None;
        };
        Some(Self {
            sequence_number: payload.sequence_number,
            event_kind,
            key: payload.keys,
            new_image: payload.new_image,
            source_locator: raw.event_source_arn,
        })
    }
}
