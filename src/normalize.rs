//! Event normalizer.
//!
//! Drops envelope records that carry no change payload and orders the rest
//! ascending by stream sequence number. Downstream stages rely on this
//! order; the request builder walks it backwards to emit newest-first.

use crate::record::{ChangeRecord, RawRecord};
use tracing::debug;

/// Filter and order raw records by sequence number.
///
/// The sort is stable, so records sharing a sequence number keep their
/// delivery order.
pub fn normalize<I>(records: I) -> Vec<ChangeRecord>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut received = 0usize;
    let mut out: Vec<ChangeRecord> = records
        .into_iter()
        .inspect(|_| received += 1)
        .filter_map(ChangeRecord::from_raw)
        .collect();

    out.sort_by(|a, b| a.sequence_number.cmp(&b.sequence_number));

    if out.len() != received {
        debug!(
            received,
            kept = out.len(),
            "Dropped records without change payload"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventKind, SequenceNumber, StreamPayload};

    fn raw(seq: &str, payload: bool) -> RawRecord {
        RawRecord {
            event_name: Some(EventKind::Insert),
            event_source_arn: format!("arn-{seq}"),
            dynamodb: payload.then(|| StreamPayload {
                sequence_number: SequenceNumber::new(seq),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_orders_by_sequence_number() {
        let out = normalize(vec![raw("30", true), raw("4", true), raw("200", true)]);
        let seqs: Vec<_> = out.iter().map(|r| r.sequence_number.0.as_str()).collect();
        assert_eq!(seqs, vec!["4", "30", "200"]);
    }

    #[test]
    fn test_drops_records_without_payload() {
        let out = normalize(vec![raw("1", true), raw("2", false), raw("3", true)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.sequence_number != SequenceNumber::new("2")));
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize(Vec::new()).is_empty());
    }

    #[test]
    fn test_equal_sequence_numbers_keep_delivery_order() {
        let out = normalize(vec![raw("5", true), raw("05", true)]);
        assert_eq!(out[0].source_locator, "arn-5");
        assert_eq!(out[1].source_locator, "arn-05");
    }
}
