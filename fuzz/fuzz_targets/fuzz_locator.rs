//! Fuzz target for stream locator parsing.
//!
//! Parsing must never panic, and a successful parse always yields a
//! non-empty region and table.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stream_replicator::locator::StreamLocator;

fuzz_target!(|data: &str| {
    if let Ok(locator) = StreamLocator::parse(data) {
        assert!(!locator.region.is_empty());
        assert!(!locator.table.is_empty());
    }

    // Embedding the input in an otherwise valid locator must not panic either.
    let wrapped = format!("arn:aws:dynamodb:{data}:123:table/{data}/stream/1");
    let _ = StreamLocator::parse(&wrapped);
});
