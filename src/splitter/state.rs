//! Local splitter state
//!
//! Atomic word-sized fields so the workload partitioner can read the
//! assignment concurrently with the sync loop. Mutations happen only from
//! the owning pod's own sync invocations.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Per-pod reconciliation state. Starts zeroed: no record claimed, no
/// ordinal, no observed fleet size.
#[derive(Debug, Default)]
pub struct SplitterState {
    /// Claimed record id, 0 while unclaimed
    id: AtomicU64,
    /// Last-confirmed ordinal, 0 while unclaimed
    num: AtomicU32,
    /// Last-observed fleet size, 0 while unclaimed
    count: AtomicU32,
    /// Hysteresis counter advanced while the pod runs unclaimed
    full_scan_count: AtomicU32,
}

impl SplitterState {
    /// Create fresh unclaimed state
    pub fn new() -> Self {
        Self::default()
    }

    /// Claimed record id, 0 while unclaimed
    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Relaxed)
    }

    /// Last-confirmed ordinal
    pub fn num(&self) -> u32 {
        self.num.load(Ordering::Relaxed)
    }

    /// Last-observed fleet size
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Current hysteresis counter value
    pub fn full_scan_count(&self) -> u32 {
        self.full_scan_count.load(Ordering::Relaxed)
    }

    /// True while no record is claimed
    pub fn is_unclaimed(&self) -> bool {
        self.id() == 0
    }

    /// Take ownership of a record: captured or freshly created
    pub(crate) fn adopt(&self, id: u64, num: u32, count: u32) {
        self.id.store(id, Ordering::Relaxed);
        self.count.store(count, Ordering::Relaxed);
        self.num.store(num, Ordering::Relaxed);
        self.full_scan_count.store(0, Ordering::Relaxed);
    }

    /// Same ordinal, different fleet size
    pub(crate) fn set_count(&self, count: u32) {
        self.count.store(count, Ordering::Relaxed);
    }

    /// Back to unclaimed. The hysteresis counter advances too, so a pod
    /// that keeps failing drifts toward creating a fresh record.
    pub(crate) fn reset(&self) {
        self.id.store(0, Ordering::Relaxed);
        self.num.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        self.full_scan_count.fetch_add(1, Ordering::Relaxed);
    }

    /// One more cycle endured unclaimed
    pub(crate) fn bump_full_scan(&self) {
        self.full_scan_count.fetch_add(1, Ordering::Relaxed);
    }
}
