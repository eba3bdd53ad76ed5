//! Sync reconciliation
//!
//! The decision tree every pod runs once per cadence tick: keep the claimed
//! record fresh in the steady state, rebalance on fleet growth or shrink,
//! capture the smallest unused record left behind by a departed pod, and
//! only create a new record after the hysteresis window has passed.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use super::state::SplitterState;
use crate::config::SplitterConfig;
use crate::error::{Result, SplitterError};
use crate::metrics::{
    MetricsSink, HANDLER_SYNC, REASON_ACTUALIZE_CONFLICT, REASON_STORAGE_ERROR,
};
use crate::partition::TaskPartition;
use crate::store::PodStore;

/// Result type for reshard callbacks
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Invoked synchronously after every successful ordinal change, before the
/// new assignment becomes externally visible as a completed sync. The
/// hosting application re-shards its in-memory work here.
pub type SyncCallback = Box<dyn Fn() -> CallbackResult + Send + Sync>;

/// Per-pod reconciler assigning this replica a unique ordinal in `1..=N`.
///
/// One instance per process. [`Splitter::sync`] is driven at a fixed
/// cadence by the scheduler harness and never overlaps with itself;
/// [`Splitter::num`] and [`Splitter::count`] are safe to read from any
/// thread.
pub struct Splitter {
    state: SplitterState,
    config: SplitterConfig,
    store: Arc<dyn PodStore>,
    metrics: Arc<dyn MetricsSink>,
    callback: Option<SyncCallback>,
}

impl Splitter {
    /// Create an unclaimed splitter. Fails on invalid configuration.
    pub fn new(
        config: SplitterConfig,
        store: Arc<dyn PodStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: SplitterState::new(),
            config,
            store,
            metrics,
            callback: None,
        })
    }

    /// Attach a reshard callback fired after every ordinal change
    pub fn with_callback(mut self, callback: SyncCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Last-confirmed ordinal, 0 while unclaimed
    pub fn num(&self) -> u32 {
        self.state.num()
    }

    /// Last-observed fleet size, 0 while unclaimed
    pub fn count(&self) -> u32 {
        self.state.count()
    }

    /// Claimed record id, 0 while unclaimed
    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// True while this pod has no confirmed ordinal
    pub fn is_unclaimed(&self) -> bool {
        self.state.is_unclaimed()
    }

    /// Snapshot of the current assignment for workload filtering
    pub fn partition(&self) -> TaskPartition {
        TaskPartition::new(self.state.num(), self.state.count())
    }

    /// Splitter configuration
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// One reconciliation pass against the store.
    ///
    /// Never fails from the caller's perspective: every store error
    /// collapses into a reset, gets logged and counted, and the next
    /// scheduled tick is the retry. At most one store-mutating call is
    /// issued per invocation.
    pub async fn sync(&self) {
        let start = Instant::now();
        self.reconcile().await;
        self.metrics
            .count_processing_duration(HANDLER_SYNC, start.elapsed().as_secs_f64());
    }

    async fn reconcile(&self) {
        let active = match self
            .store
            .get_active_pod_count(&self.config.group, self.config.max_unused)
            .await
        {
            Ok(active) => active,
            Err(err) => {
                self.state.reset();
                error!("sync: get_active_pod_count: {}", err);
                self.metrics.incr_fail(HANDLER_SYNC, REASON_STORAGE_ERROR);
                return;
            }
        };

        let count = self.state.count();
        let num = self.state.num();

        // Fleet size unchanged and our ordinal still in range: just keep
        // the record fresh.
        if count > 0 && active == count && num <= active {
            if self.refresh_own("steady").await {
                info!(
                    "pod actualized: id={}, num={}, count={}, group={}",
                    self.state.id(),
                    self.state.num(),
                    active,
                    self.config.group
                );
            }
            return;
        }

        if active < count || active < num {
            self.shrink(active).await;
        } else if active > count || active == 0 {
            self.grow(active).await;
        }
    }

    /// The fleet shrank, or our ordinal fell out of range.
    async fn shrink(&self, active: u32) {
        let num = self.state.num();
        if num != 0 && num <= active {
            if self.refresh_own("shrink").await {
                // Same ordinal, smaller fleet.
                self.state.set_count(active);
                info!(
                    "pod count decreased: id={}, num={}, count={}, group={}",
                    self.state.id(),
                    num,
                    active,
                    self.config.group
                );
            }
            return;
        }

        // Our ordinal is out of range: take over the record of a departed
        // pod, or fall back to processing the whole workload.
        if !self.capture_unused(active).await {
            self.state.reset();
        }
    }

    /// The fleet grew, or we have not claimed a record yet.
    async fn grow(&self, active: u32) {
        let num = self.state.num();
        if num != 0 && num <= active {
            if self.refresh_own("grow").await {
                // Same ordinal, larger fleet.
                self.state.set_count(active);
                info!(
                    "pod count increased: id={}, num={}, count={}, group={}",
                    self.state.id(),
                    num,
                    active,
                    self.config.group
                );
            }
            return;
        }

        if self.capture_unused(active + 1).await {
            return;
        }

        // Hold off creating a record so concurrent pods get a chance to
        // finish capturing expired ones first.
        if self.state.full_scan_count() >= self.config.full_scan_count {
            if let Err(err) = self.create_pod(active + 1).await {
                self.state.reset();
                error!("sync: create pod: {}", err);
                self.metrics.incr_fail(HANDLER_SYNC, REASON_STORAGE_ERROR);
            }
        } else {
            self.state.bump_full_scan();
        }
    }

    /// Try to take over the smallest-numbered unused record.
    ///
    /// Reclaiming from the smallest ordinal up is what heals gaps left by
    /// out-of-order pod deaths.
    async fn capture_unused(&self, target_count: u32) -> bool {
        let unused = match self
            .store
            .get_first_unused_pod(&self.config.group, self.config.max_unused)
            .await
        {
            Ok(rec) => rec,
            Err(SplitterError::NoEntries) => return false,
            Err(err) => {
                self.state.reset();
                error!("sync: get_first_unused_pod: {}", err);
                self.metrics.incr_fail(HANDLER_SYNC, REASON_STORAGE_ERROR);
                return false;
            }
        };

        if let Err(err) = self
            .store
            .actualize_pod(unused.id, self.state.id(), self.config.max_unused)
            .await
        {
            self.state.reset();
            error!("sync: capture actualize_pod: {}", err);
            self.record_actualize_failure(&err);
            return false;
        }

        info!(
            "unused pod captured: id={}, num={}, group={}, count={}",
            unused.id, unused.num, self.config.group, target_count
        );
        self.state.adopt(unused.id, unused.num, target_count);

        if let Err(err) = self.run_callback() {
            // Adoption sticks; only this cycle reports failure.
            error!("sync: reshard callback: {}", err);
            return false;
        }
        true
    }

    /// Insert a fresh record with the next ordinal and adopt it.
    async fn create_pod(&self, num: u32) -> Result<()> {
        let rec = self.store.add_pod(num, &self.config.group).await?;

        info!(
            "new pod created: id={}, num={}, group={}, count={}",
            rec.id, rec.num, self.config.group, num
        );
        self.state.adopt(rec.id, rec.num, num);
        self.run_callback()
    }

    /// Refresh our own record's `updated_at`. On failure the pod resets and
    /// the cycle is counted as a conflict or storage error.
    async fn refresh_own(&self, site: &str) -> bool {
        match self
            .store
            .actualize_pod(self.state.id(), 0, self.config.delay / 2)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                self.state.reset();
                error!("sync: {}: actualize_pod: {}", site, err);
                self.record_actualize_failure(&err);
                false
            }
        }
    }

    fn record_actualize_failure(&self, err: &SplitterError) {
        let reason = if err.is_conflict() {
            REASON_ACTUALIZE_CONFLICT
        } else {
            REASON_STORAGE_ERROR
        };
        self.metrics.incr_fail(HANDLER_SYNC, reason);
    }

    fn run_callback(&self) -> Result<()> {
        match &self.callback {
            Some(callback) => callback().map_err(|err| SplitterError::Callback {
                message: err.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Splitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.config.group,
            self.state.num(),
            self.state.count()
        )
    }
}
