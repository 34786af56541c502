//! # tracetree
//!
//! Hierarchical trace tree and virtualization engine for observability UIs.
//!
//! Builds a tree of execution-span/transaction nodes from partially loaded
//! backend records, keeps a flat, index-addressable sequence of the visible
//! nodes for windowed rendering, supports incremental expand/collapse and
//! asynchronous zoom (fetch and graft a deeper subtree in place), and
//! evaluates a small typed filter-query language against node attributes.
//!
//! This crate is a library consumed by a host application; it has no wire
//! protocol or UI of its own. The host supplies a [`SubtreeFetcher`] for
//! zoom fetches and renders rows by indexing [`TraceTree::flattened`].
//!
//! ```no_run
//! use tracetree::{TraceOptions, TraceTree};
//!
//! let records = serde_json::json!([
//!     {"span_id": "root", "is_transaction": true, "children": [
//!         {"span_id": "child", "op": "db.query", "children": []}
//!     ]}
//! ]);
//! let tree = TraceTree::from_value(records, TraceOptions::default())?;
//! for (row, &id) in tree.flattened().iter().enumerate() {
//!     let node = tree.get(id).unwrap();
//!     println!("{row}: {} (depth {})", node.payload().span_id, node.depth());
//! }
//! let slow = tree.search("duration:>1.5")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod query;
pub mod trace;
pub mod tree;

pub use error::{FetchError, TreeError};
pub use query::{Attributed, Query, QueryError, QueryOp, QueryToken, TypedValue};
pub use trace::{
    ErrorRef, FetchStatus, FetchTarget, RawSpan, SpanCategory, SpanKind, SpanNode, SubtreeFetcher,
    TraceOptions, TraceTree, ZoomOutcome, ZoomRequest, ZoomStart,
};
pub use tree::{ExpandOptions, GenericTree, Node, NodeId, RawRecord};
