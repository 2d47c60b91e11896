//! Fuzz target for invocation envelope decoding.
//!
//! Arbitrary bytes must decode to an error or to records that normalize
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stream_replicator::normalize::normalize;
use stream_replicator::record::StreamEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(event) = StreamEvent::from_json(text) {
        let received = event.records.len();
        let records = normalize(event.records);
        assert!(records.len() <= received);
        assert!(records
            .windows(2)
            .all(|w| w[0].sequence_number <= w[1].sequence_number));
    }
});
