//! Error types for tree construction, node handles, and zoom fetches
//!
//! Structural errors (`TreeError`) are returned synchronously to the caller.
//! Fetch failures (`FetchError`) come from the host's fetcher and are recorded
//! on the affected node rather than propagated through the tree.

use thiserror::Error;

/// Errors raised by tree construction and node-handle operations
#[derive(Error, Debug)]
pub enum TreeError {
    /// Raw input record violated the expected shape (e.g. non-array `children`)
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// Node handle was issued by a different tree
    #[error("node handle belongs to a different tree (stamp {got}, expected {expected})")]
    ForeignNode { got: u32, expected: u32 },

    /// Node handle points into a subtree that has been discarded
    #[error("node handle {index} refers to a discarded node")]
    DanglingNode { index: u32 },

    /// Zoom requested on a node that is not a fetch boundary
    #[error("span {span_id} is not a fetch boundary")]
    NotFetchable { span_id: String },
}

impl TreeError {
    /// Create a malformed-record error with preserved context
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Whether this error indicates a bad node handle rather than bad input
    pub fn is_handle_error(&self) -> bool {
        matches!(self, Self::ForeignNode { .. } | Self::DanglingNode { .. })
    }
}

/// Fetch failure reported by the host's [`SubtreeFetcher`](crate::trace::SubtreeFetcher)
///
/// Stored node-locally as `FetchStatus::Errored`; retry policy belongs to the
/// host, so the tree never retries on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch failed: {message}")]
pub struct FetchError {
    message: String,
    transient: bool,
}

impl FetchError {
    /// Create a permanent fetch error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// Create a fetch error the host may reasonably retry
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this is a connection-style error that might be transient
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}
