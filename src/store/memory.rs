//! In-memory coordination store
//!
//! Mutex-guarded map backend with real timestamp arithmetic. Tests and the
//! fleet simulator share it; it is not a network store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use super::{PodRecord, PodStore};
use crate::error::{Result, SplitterError};

/// Map-backed store keyed by record id.
///
/// Ids are allocated from a sequential counter; rows are never deleted, a
/// record only leaves the active set by aging past the staleness window.
pub struct InMemoryStore {
    /// Staleness window applied to the `add_pod` active-uniqueness check
    max_unused: Duration,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<u64, PodRecord>,
    next_id: u64,
}

impl InMemoryStore {
    /// Create an empty store enforcing ordinal uniqueness over `max_unused`
    pub fn new(max_unused: Duration) -> Self {
        Self {
            max_unused,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Backdate a record so any staleness window classifies it as unused.
    ///
    /// Simulates the record's owner dying ungracefully and the staleness
    /// window elapsing, without touching the row otherwise.
    pub fn expire(&self, id: u64) {
        if let Some(rec) = self.inner.lock().records.get_mut(&id) {
            rec.updated_at = Utc::now() - TimeDelta::days(365);
        }
    }

    /// Sorted active ordinals in a group. Assertion helper.
    pub fn active_nums(&self, group: &str, max_unused: Duration) -> Vec<u32> {
        let now = Utc::now();
        let inner = self.inner.lock();
        let mut nums: Vec<u32> = inner
            .records
            .values()
            .filter(|rec| rec.group == group && is_active(rec, now, max_unused))
            .map(|rec| rec.num)
            .collect();
        nums.sort_unstable();
        nums
    }

    /// Snapshot of one record, if it exists
    pub fn record(&self, id: u64) -> Option<PodRecord> {
        self.inner.lock().records.get(&id).cloned()
    }

    /// Total rows ever created (records are never deleted)
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }
}

fn is_active(rec: &PodRecord, now: DateTime<Utc>, max_unused: Duration) -> bool {
    match (now - rec.updated_at).to_std() {
        Ok(age) => age <= max_unused,
        // updated_at in the future reads as just refreshed
        Err(_) => true,
    }
}

#[async_trait]
impl PodStore for InMemoryStore {
    async fn get_active_pod_count(&self, group: &str, max_unused: Duration) -> Result<u32> {
        let now = Utc::now();
        let inner = self.inner.lock();
        let count = inner
            .records
            .values()
            .filter(|rec| rec.group == group && is_active(rec, now, max_unused))
            .count();
        Ok(count as u32)
    }

    async fn get_first_unused_pod(&self, group: &str, max_unused: Duration) -> Result<PodRecord> {
        let now = Utc::now();
        let inner = self.inner.lock();
        inner
            .records
            .values()
            .filter(|rec| rec.group == group && !is_active(rec, now, max_unused))
            .min_by_key(|rec| (rec.num, rec.id))
            .cloned()
            .ok_or(SplitterError::NoEntries)
    }

    async fn add_pod(&self, num: u32, group: &str) -> Result<PodRecord> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let taken = inner
            .records
            .values()
            .any(|rec| rec.group == group && rec.num == num && is_active(rec, now, self.max_unused));
        if taken {
            return Err(SplitterError::OrdinalTaken {
                num,
                group: group.to_string(),
            });
        }

        inner.next_id += 1;
        let rec = PodRecord {
            id: inner.next_id,
            num,
            group: group.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.records.insert(rec.id, rec.clone());
        Ok(rec)
    }

    async fn actualize_pod(&self, new_id: u64, old_id: u64, max_unused: Duration) -> Result<()> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let rec = inner
            .records
            .get_mut(&new_id)
            .ok_or(SplitterError::NoEntries)?;

        // Transfer mode: the target must be unused or already ours.
        if old_id != 0 && new_id != old_id && is_active(rec, now, max_unused) {
            return Err(SplitterError::NoEntries);
        }

        rec.updated_at = now;
        Ok(())
    }
}
