//! Error types for the pod splitter
//!
//! Two categorical failure kinds cross the store seam: `NoEntries` (a
//! conditional query or CAS found no matching record) and everything else
//! (treated as a storage failure). No error ever crosses the sync boundary;
//! the splitter absorbs them all into state transitions.

use thiserror::Error;

/// Primary error type for splitter operations
#[derive(Debug, Error)]
pub enum SplitterError {
    // ========== Store Errors ==========

    /// A conditional query or CAS matched nothing. From a candidate lookup
    /// this means "no candidate, skip"; from an actualize it means the
    /// caller lost the race and must reset.
    #[error("no entries")]
    NoEntries,

    /// Any other backend failure (network, serialization, internal)
    #[error("storage operation failed: {message}")]
    Storage { message: String },

    /// Insert rejected because the ordinal is already held by an active
    /// record in the group
    #[error("ordinal {num} already active in group {group}")]
    OrdinalTaken { num: u32, group: String },

    // ========== Local Errors ==========

    /// The post-adoption reshard callback failed
    #[error("reshard callback failed: {message}")]
    Callback { message: String },

    /// Configuration rejected at construction time
    #[error("invalid splitter config: {reason}")]
    InvalidConfig { reason: String },
}

impl SplitterError {
    /// True when an actualize lost its race rather than the backend
    /// failing outright. Drives the failure-reason metric split.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SplitterError::NoEntries)
    }

    /// Wrap an arbitrary backend failure
    pub fn storage(message: impl Into<String>) -> Self {
        SplitterError::Storage {
            message: message.into(),
        }
    }
}

/// Result type alias for splitter operations
pub type Result<T> = std::result::Result<T, SplitterError>;
