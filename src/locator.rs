// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stream source locator parsing.
//!
//! A change record's source locator is the stream ARN, which embeds the
//! origin region and table:
//!
//! ```text
//! arn:aws:dynamodb:us-east-1:123456789012:table/Orders/stream/2024-01-01T00:00:00.000
//!                  ^^^^^^^^^              ^^^^^^^^^^^^
//!                  region                 table
//! ```

use crate::error::{ReplicationError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static STREAM_ARN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^arn:aws:dynamodb:(.*?):.*?:table/(.*?)/stream")
        .expect("stream ARN pattern is valid")
});

/// Origin region and table recovered from a stream locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLocator {
    pub region: String,
    pub table: String,
}

impl StreamLocator {
    /// Parse a stream ARN.
    ///
    /// Fails with [`ReplicationError::MalformedLocator`] if the region or
    /// table cannot be found.
    pub fn parse(locator: &str) -> Result<Self> {
        let malformed = || ReplicationError::MalformedLocator {
            locator: locator.to_string(),
        };

        let caps = STREAM_ARN.captures(locator).ok_or_else(malformed)?;
        let region = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let table = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if region.is_empty() || table.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            region: region.to_string(),
            table: table.to_string(),
        })
    }
}
