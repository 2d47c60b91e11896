// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the stream replicator.
//!
//! Only two conditions escape the replication pipeline: a source locator
//! that cannot be parsed, and a retry loop that runs out of time. Individual
//! store call failures are absorbed by the batch writer and re-enter the
//! retry loop as [`BatchOutcome`](crate::writer::BatchOutcome) values.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `MalformedLocator` | No | Stream source locator has no region/table |
//! | `DeadlineExceeded` | Yes | Requests still unresolved at the deadline |
//! | `InvalidEvent` | No | Incoming event envelope could not be decoded |
//! | `Config` | No | Configuration invalid or missing |
//! | `Store` | Yes | Store call failed outside the batch pipeline |
//!
//! # Retry Behavior
//!
//! `DeadlineExceeded` is fatal for the invocation but retryable by the
//! invoker: returning it makes the stream source re-deliver the whole batch,
//! and idempotent overwrites make the replay safe.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// The change record's source locator does not embed a region and table.
    ///
    /// Provenance cannot be established, so the whole invocation aborts
    /// before any store call is issued.
    #[error("Unable to parse table and region from locator: {locator}")]
    MalformedLocator { locator: String },

    /// The retry loop exhausted its time budget with requests still failing.
    #[error(
        "Unable to handle {unresolved} out of {total} requests after {attempts} attempts ({elapsed:?})"
    )]
    DeadlineExceeded {
        unresolved: usize,
        total: usize,
        attempts: u32,
        elapsed: Duration,
    },

    /// The invocation payload is not a change-stream event.
    #[error("Invalid stream event: {0}")]
    InvalidEvent(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store call failure surfaced outside the batch writer.
    #[error("Store error ({operation}): {message}")]
    Store { operation: String, message: String },
}

impl ReplicationError {
    /// Create a store error for the given operation.
    pub fn store(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MalformedLocator { .. } => false,
            Self::DeadlineExceeded { .. } => true, // invoker re-delivers the batch
            Self::InvalidEvent(_) => false,
            Self::Config(_) => false,
            Self::Store { .. } => true,
        }
    }

    /// `(unresolved, total)` counts for a deadline failure.
    pub fn unresolved_counts(&self) -> Option<(usize, usize)> {
        match self {
            Self::DeadlineExceeded {
                unresolved, total, ..
            } => Some((*unresolved, *total)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ReplicationError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidEvent(e.to_string())
    }
}
