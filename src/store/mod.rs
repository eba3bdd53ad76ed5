//! Coordination store seam
//!
//! The splitter depends only on this narrow contract. A production backend
//! is a relational or key-value store with row-level conditional updates;
//! the in-memory backend here serves tests and single-process simulation.

pub mod memory;

pub use memory::InMemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One persisted row per assigned ordinal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRecord {
    /// Primary key, unique across every record ever created for the group
    pub id: u64,
    /// Assigned ordinal, unique among active records within the group
    pub num: u32,
    /// Store namespace
    pub group: String,
    /// Set once at insertion
    pub created_at: DateTime<Utc>,
    /// Refreshed by every successful actualize
    pub updated_at: DateTime<Utc>,
}

/// Narrow contract every coordination backend must provide.
///
/// A record is *active* while `now - updated_at <= max_unused` and *unused*
/// afterwards; unused ordinals are recyclable. Records are never deleted.
#[async_trait]
pub trait PodStore: Send + Sync {
    /// Count of records in `group` refreshed within `max_unused`
    async fn get_active_pod_count(&self, group: &str, max_unused: Duration) -> Result<u32>;

    /// The unused record in `group` with the smallest `num`, or
    /// [`SplitterError::NoEntries`](crate::SplitterError::NoEntries) when
    /// every record is active.
    async fn get_first_unused_pod(&self, group: &str, max_unused: Duration) -> Result<PodRecord>;

    /// Insert a record with the given ordinal, assigning a fresh unique id
    /// and current timestamps. Must fail while `(group, num)` is held by an
    /// active record.
    async fn add_pod(&self, num: u32, group: &str) -> Result<PodRecord>;

    /// The protocol's compare-and-set primitive. With `old_id == 0`,
    /// refresh record `new_id` if it exists. With `old_id != 0`, transfer
    /// `new_id` to the caller, allowed only while `new_id` is unused or is
    /// already the caller's own record; anything else signals
    /// [`NoEntries`](crate::SplitterError::NoEntries) (the caller lost the
    /// race).
    async fn actualize_pod(&self, new_id: u64, old_id: u64, max_unused: Duration) -> Result<()>;
}
