//! Configuration for the stream replicator.
//!
//! The target region and table identify where replicated writes go. They
//! double as the loop-prevention signature: an incoming item whose
//! provenance tag names this same region and table is the target's own
//! reflected write and is never sent back.
//!
//! Configuration is passed explicitly to the
//! [`RequestBuilder`](crate::request::RequestBuilder) and the
//! [`RetryController`](crate::coordinator::RetryController). Only
//! [`ReplicationConfig::from_env()`] reads process state.
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── target_region: String         # Destination region
//! ├── target_table: String          # Destination table
//! └── settings: ReplicationSettings
//!     ├── deadline_secs: u64        # Wall-clock ceiling per invocation (245)
//!     ├── backoff_base_secs: u64    # Linear backoff step (5)
//!     ├── max_concurrency: usize    # Batch writer pool size (10)
//!     └── max_batch_size: usize     # Store per-call item limit (25)
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! target_region: "eu-west-1"
//! target_table: "Orders"
//! settings:
//!   deadline_secs: 245
//!   max_concurrency: 10
//! ```

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Store limit on requests in a single bulk write call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Environment variable naming the destination region.
pub const ENV_TARGET_REGION: &str = "TARGET_REGION";
/// Environment variable naming the destination table.
pub const ENV_TARGET_TABLE: &str = "TARGET_TABLE";

const ENV_DEADLINE_SECS: &str = "REPLICATION_DEADLINE_SECS";
const ENV_BACKOFF_BASE_SECS: &str = "REPLICATION_BACKOFF_BASE_SECS";
const ENV_MAX_CONCURRENCY: &str = "REPLICATION_MAX_CONCURRENCY";

/// Destination of replicated writes and the loop-prevention signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Region of the table we replicate into.
    pub target_region: String,

    /// Name of the table we replicate into.
    pub target_table: String,

    /// Retry, batching and concurrency tunables.
    #[serde(default)]
    pub settings: ReplicationSettings,
}

impl ReplicationConfig {
    /// Create a config with default settings.
    pub fn new(target_region: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            target_region: target_region.into(),
            target_table: target_table.into(),
            settings: ReplicationSettings::default(),
        }
    }

    /// Create a config for testing with fast backoff and a short deadline.
    pub fn for_testing(target_region: &str, target_table: &str) -> Self {
        Self {
            target_region: target_region.to_string(),
            target_table: target_table.to_string(),
            settings: ReplicationSettings::testing(),
        }
    }

    /// Load the config from process environment.
    ///
    /// `TARGET_REGION` and `TARGET_TABLE` are required. The retry settings
    /// may be overridden with `REPLICATION_DEADLINE_SECS`,
    /// `REPLICATION_BACKOFF_BASE_SECS` and `REPLICATION_MAX_CONCURRENCY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ReplicationError::Config(format!("{name} is not set")))
        };

        let mut settings = ReplicationSettings::default();
        if let Some(v) = lookup(ENV_DEADLINE_SECS) {
            settings.deadline_secs = parse_var(ENV_DEADLINE_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_BACKOFF_BASE_SECS) {
            settings.backoff_base_secs = parse_var(ENV_BACKOFF_BASE_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_CONCURRENCY) {
            settings.max_concurrency = parse_var(ENV_MAX_CONCURRENCY, &v)?;
        }

        let config = Self {
            target_region: required(ENV_TARGET_REGION)?,
            target_table: required(ENV_TARGET_TABLE)?,
            settings,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.target_region.trim().is_empty() {
            return Err(ReplicationError::Config("target_region is empty".into()));
        }
        if self.target_table.trim().is_empty() {
            return Err(ReplicationError::Config("target_table is empty".into()));
        }
        self.settings.validate()
    }

    /// Check whether a provenance tag names this config's target.
    pub fn is_own_reflection(&self, source_region: &str, source_table: &str) -> bool {
        source_region == self.target_region && source_table == self.target_table
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ReplicationError::Config(format!("{name} has invalid value {value:?}")))
}

/// Retry, batching and concurrency tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Wall-clock ceiling for one invocation (seconds).
    /// Chosen to stay inside an enclosing invocation limit of 300s.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Linear backoff step: round N sleeps `N * backoff_base` (seconds).
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Maximum batches written concurrently within a round.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum requests per bulk write call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_deadline_secs() -> u64 {
    245
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_max_concurrency() -> usize {
    10
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_WRITE_ITEMS
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            max_concurrency: default_max_concurrency(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl ReplicationSettings {
    /// Short deadline for tests (run them under paused tokio time).
    pub fn testing() -> Self {
        Self {
            deadline_secs: 30,
            backoff_base_secs: 1,
            max_concurrency: 4,
            max_batch_size: MAX_BATCH_WRITE_ITEMS,
        }
    }

    /// Deadline as a Duration.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Backoff step as a Duration.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(ReplicationError::Config("max_concurrency must be > 0".into()));
        }
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_WRITE_ITEMS {
            return Err(ReplicationError::Config(format!(
                "max_batch_size must be within 1..={MAX_BATCH_WRITE_ITEMS}, got {}",
                self.max_batch_size
            )));
        }
        Ok(())
    }
}
