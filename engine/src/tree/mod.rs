//! Generic tree structure and flattening
//!
//! - `node` - arena node primitives and handles
//! - `generic` - payload-agnostic tree: build, expand/collapse, sort, flatten
//!
//! The trace-domain specialization lives in the `trace` module.

mod generic;
mod node;

pub use generic::{ExpandOptions, GenericTree, RawRecord};
pub use node::{Node, NodeId};
