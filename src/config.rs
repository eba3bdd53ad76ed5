//! Splitter configuration
//!
//! Cadence and staleness settings for the sync loop.

use std::time::Duration;

use crate::error::{Result, SplitterError};
use crate::{DEFAULT_DELAY_SECS, DEFAULT_FULL_SCAN_COUNT, DEFAULT_MAX_UNUSED_SECS};

/// Configuration for a splitter instance
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Sync cadence. Must stay below `max_unused`, or a pod can time out
    /// its own record between two syncs.
    pub delay: Duration,
    /// Staleness threshold separating active records from unused ones
    pub max_unused: Duration,
    /// Sync cycles an unclaimed pod endures before creating a new record
    pub full_scan_count: u32,
    /// Store namespace; splitters coordinate only within their group
    pub group: String,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
            max_unused: Duration::from_secs(DEFAULT_MAX_UNUSED_SECS),
            full_scan_count: DEFAULT_FULL_SCAN_COUNT,
            group: "splitter".into(),
        }
    }
}

impl SplitterConfig {
    /// Reject configurations the protocol cannot run safely on
    pub fn validate(&self) -> Result<()> {
        if self.delay >= self.max_unused {
            return Err(SplitterError::InvalidConfig {
                reason: format!(
                    "delay {:?} must be shorter than max_unused {:?}",
                    self.delay, self.max_unused
                ),
            });
        }
        if self.group.is_empty() {
            return Err(SplitterError::InvalidConfig {
                reason: "group name must not be empty".into(),
            });
        }
        Ok(())
    }
}
