//! Sync observability
//!
//! The splitter reports through the narrow [`MetricsSink`] trait; the
//! measurements themselves are a fixed set (one latency histogram, one
//! failure counter per reason, one fleet gauge) held in a process-wide
//! const-initialized [`SyncMetrics`] and rendered as Prometheus text for
//! scrape endpoints.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Handler name the splitter reports all measurements under
pub const HANDLER_SYNC: &str = "Splitter.Sync";

/// Failure reason: an actualize found its target gone or owned elsewhere
pub const REASON_ACTUALIZE_CONFLICT: &str = "actualize_conflict";
/// Failure reason: any other store failure
pub const REASON_STORAGE_ERROR: &str = "storage_error";

/// Sink for the measurements the sync loop reports
pub trait MetricsSink: Send + Sync {
    /// Record one sync's wall-clock duration in seconds under `handler`
    fn count_processing_duration(&self, handler: &str, seconds: f64);
    /// Count one failed cycle under `handler` with a reason tag
    fn incr_fail(&self, handler: &str, reason: &str);
}

/// Sink writing to the process-wide [`GLOBAL`] metrics
pub struct PromSink;

impl MetricsSink for PromSink {
    fn count_processing_duration(&self, _handler: &str, seconds: f64) {
        GLOBAL.observe_duration(seconds);
    }

    fn incr_fail(&self, _handler: &str, reason: &str) {
        GLOBAL.record_failure(reason);
    }
}

/// Discards every measurement. Test fixtures use this.
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn count_processing_duration(&self, _handler: &str, _seconds: f64) {}
    fn incr_fail(&self, _handler: &str, _reason: &str) {}
}

/// Upper bucket bounds for sync latency, in seconds. A sync is a handful
/// of store round-trips, so the range tops out early.
const BUCKET_BOUNDS: [f64; 10] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// The fixed set of sync measurements.
///
/// Everything is lock-free atomics so the sink calls stay cheap on the
/// sync path; the sum is carried as integer microseconds to keep the add
/// atomic.
pub struct SyncMetrics {
    bucket_hits: [AtomicU64; BUCKET_BOUNDS.len()],
    sum_micros: AtomicU64,
    syncs: AtomicU64,
    storage_errors: AtomicU64,
    conflicts: AtomicU64,
    fleet_size: AtomicI64,
}

/// Process-wide metrics instance scraped by `/metrics` endpoints
pub static GLOBAL: SyncMetrics = SyncMetrics::new();

impl SyncMetrics {
    /// Create a zeroed measurement set
    pub const fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            bucket_hits: [ZERO; BUCKET_BOUNDS.len()],
            sum_micros: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            fleet_size: AtomicI64::new(0),
        }
    }

    /// Record one sync's duration in seconds
    pub fn observe_duration(&self, seconds: f64) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        for (hits, bound) in self.bucket_hits.iter().zip(BUCKET_BOUNDS) {
            if seconds <= bound {
                hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Count one failed cycle under the given reason
    pub fn record_failure(&self, reason: &str) {
        if reason == REASON_ACTUALIZE_CONFLICT {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
        } else {
            self.storage_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Publish the last observed active pod count
    pub fn set_fleet_size(&self, size: i64) {
        self.fleet_size.store(size, Ordering::Relaxed);
    }

    /// Total syncs observed
    pub fn syncs(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    /// Cycles lost to storage errors
    pub fn storage_errors(&self) -> u64 {
        self.storage_errors.load(Ordering::Relaxed)
    }

    /// Cycles that lost an actualize race
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Last published fleet size
    pub fn fleet_size(&self) -> i64 {
        self.fleet_size.load(Ordering::Relaxed)
    }
}

impl fmt::Display for SyncMetrics {
    /// Prometheus text exposition of the whole measurement set
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "# HELP podsplit_sync_duration_seconds Sync reconciliation latency"
        )?;
        writeln!(f, "# TYPE podsplit_sync_duration_seconds histogram")?;
        for (hits, bound) in self.bucket_hits.iter().zip(BUCKET_BOUNDS) {
            writeln!(
                f,
                "podsplit_sync_duration_seconds_bucket{{le=\"{}\"}} {}",
                bound,
                hits.load(Ordering::Relaxed)
            )?;
        }
        writeln!(
            f,
            "podsplit_sync_duration_seconds_sum {}",
            self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
        )?;
        writeln!(f, "podsplit_sync_duration_seconds_count {}", self.syncs())?;

        writeln!(
            f,
            "# HELP podsplit_sync_failures_total Sync cycles lost to a failure, by reason"
        )?;
        writeln!(f, "# TYPE podsplit_sync_failures_total counter")?;
        writeln!(
            f,
            "podsplit_sync_failures_total{{reason=\"{}\"}} {}",
            REASON_STORAGE_ERROR,
            self.storage_errors()
        )?;
        writeln!(
            f,
            "podsplit_sync_failures_total{{reason=\"{}\"}} {}",
            REASON_ACTUALIZE_CONFLICT,
            self.conflicts()
        )?;

        writeln!(
            f,
            "# HELP podsplit_fleet_size Last observed active pod count"
        )?;
        writeln!(f, "# TYPE podsplit_fleet_size gauge")?;
        writeln!(f, "podsplit_fleet_size {}", self.fleet_size())
    }
}

/// Gather the process-wide metrics in Prometheus text format
pub fn gather_metrics() -> String {
    GLOBAL.to_string()
}
