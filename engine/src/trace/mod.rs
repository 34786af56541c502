//! Trace-domain specialization of the generic tree
//!
//! - `span` - raw records, payloads, and classification
//! - `tree` - the trace tree: indexing, zoom, and search

mod span;
mod tree;

pub use span::{ErrorRef, FetchStatus, RawSpan, SpanCategory, SpanKind, SpanNode};
pub use tree::{
    FetchTarget, SubtreeFetcher, TraceOptions, TraceTree, ZoomOutcome, ZoomRequest, ZoomStart,
};
