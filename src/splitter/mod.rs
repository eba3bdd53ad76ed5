//! Pod splitter
//!
//! The per-replica reconciler that assigns each pod of a scaled fleet a
//! unique ordinal for workload partitioning.

pub mod state;
pub mod sync;

pub use state::SplitterState;
pub use sync::{CallbackResult, Splitter, SyncCallback};
