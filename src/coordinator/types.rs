//! Retry controller state types.
//!
//! # State Transitions
//!
//! ```text
//!             round completes, failures remain, time left
//!            ┌──────────────────────────────────┐
//!            ▼                                  │
//!         Running ──── round completes ─────────┘
//!            │
//!            ├── no failures ─────────────────▶ Converged
//!            │
//!            └── failures, deadline reached ──▶ DeadlineExceeded
//! ```
//!
//! - **Running**: a round is in flight or the controller is backing off.
//! - **Converged**: every request was applied. Terminal.
//! - **DeadlineExceeded**: requests remain unresolved at the deadline. Terminal.

use std::time::Duration;

/// State of the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Dispatching rounds.
    Running,

    /// All requests applied.
    Converged,

    /// Time budget exhausted with failures outstanding.
    DeadlineExceeded,
}

impl ControllerState {
    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ControllerState::Running)
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Running => write!(f, "Running"),
            ControllerState::Converged => write!(f, "Converged"),
            ControllerState::DeadlineExceeded => write!(f, "DeadlineExceeded"),
        }
    }
}

/// Outcome of one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    /// Round number (1-indexed).
    pub attempt: u32,
    /// Batches written in the round.
    pub batches: usize,
    /// Conflict waves the batches were grouped into.
    pub waves: usize,
    /// Requests left failing after the round.
    pub failed: usize,
}

/// Summary of a converged invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationSummary {
    /// Change records handled (after normalization).
    pub handled: usize,
    /// Write requests built from those records.
    pub requests: usize,
    /// Rounds needed to converge.
    pub attempts: u32,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}
