//! Fuzz target for sequence number ordering.
//!
//! Comparison must never panic on arbitrary text and must stay a total
//! order consistent with equality.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::cmp::Ordering;
use stream_replicator::record::SequenceNumber;

fuzz_target!(|data: (&str, &str)| {
    let a = SequenceNumber::new(data.0);
    let b = SequenceNumber::new(data.1);

    assert_eq!(a.cmp(&a), Ordering::Equal);
    assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
});
