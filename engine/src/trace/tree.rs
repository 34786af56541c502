//! Trace tree: spans and transactions over the generic tree
//!
//! Adds what the payload-agnostic tree cannot know about:
//!
//! - a `span_id -> NodeId` index for direct node lookup
//! - asynchronous zoom: fetch a deeper subtree through an injected
//!   [`SubtreeFetcher`] capability and graft it in place, with coalescing of
//!   concurrent requests and last-request-wins staleness handling
//! - whole-tree search (`find_all`, filter-query `search`) independent of the
//!   flattened cache
//!
//! Zoom is split-phase so a host event loop can own the await point:
//! [`TraceTree::begin_zoom_in`] transitions state and hands out a request
//! ticket, [`TraceTree::finish_zoom_in`] applies or discards the settled
//! response. [`TraceTree::zoom`] composes both around a fetcher for hosts
//! that do not need the split. Graft and re-flatten happen inside one
//! synchronous call; no reader can observe one without the other.

use std::cmp::Ordering;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;

use crate::error::{FetchError, TreeError};
use crate::query::{Query, QueryError};
use crate::tree::{ExpandOptions, GenericTree, Node, NodeId};

use super::span::{FetchStatus, RawSpan, SpanCategory, SpanNode};

// ============================================================================
// COLLABORATOR INTERFACES
// ============================================================================

/// What the backend needs to locate a node's deeper subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTarget {
    pub span_id: String,
    pub project_slug: Option<String>,
    pub start_timestamp: f64,
    pub timestamp: f64,
}

/// Host-supplied fetch capability for zoom operations.
///
/// Must be idempotent-safe to call again after a cancelled request; the tree
/// never retries on its own and owns no timeout policy.
#[async_trait]
pub trait SubtreeFetcher: Send + Sync {
    async fn fetch(&self, target: &FetchTarget) -> Result<Vec<RawSpan>, FetchError>;
}

// ============================================================================
// ZOOM TYPES
// ============================================================================

/// Ticket for an in-flight zoom fetch, carrying the generation observed at
/// [`TraceTree::begin_zoom_in`] time.
#[derive(Debug, Clone)]
pub struct ZoomRequest {
    node: NodeId,
    seq: u64,
    target: FetchTarget,
}

impl ZoomRequest {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn target(&self) -> &FetchTarget {
        &self.target
    }
}

/// Result of [`TraceTree::begin_zoom_in`]
#[derive(Debug)]
pub enum ZoomStart {
    /// State transitioned to `Fetching`; the caller owns the fetch
    Started(ZoomRequest),
    /// A fetch is already in flight; no duplicate request is issued
    InFlight,
    /// The subtree is already grafted; nothing to fetch
    AlreadyZoomed,
}

/// Settled result of a zoom operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoomOutcome {
    /// Fetched subtree grafted; `inserted` flattened entries spliced in
    Applied { inserted: usize },
    /// Grafted subtree discarded; `removed` flattened entries spliced out
    Collapsed { removed: usize },
    /// Request coalesced onto an in-flight fetch
    Coalesced,
    /// Response superseded by a later zoom call and discarded
    Stale,
    /// Fetch failed; recorded node-locally, children untouched
    Errored,
    /// Nothing to do
    Unchanged,
}

/// Build-time options for [`TraceTree`]
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    /// Start every kept node expanded
    pub expand_all: bool,
    /// Elide `hidden: true` wrapper records, reparenting their children
    pub skip_hidden: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            expand_all: true,
            skip_hidden: true,
        }
    }
}

fn skip_hidden_wrapper(payload: &SpanNode) -> bool {
    payload.is_hidden_wrapper()
}

// ============================================================================
// TRACE TREE
// ============================================================================

/// Trace-domain tree over [`SpanNode`] payloads.
#[derive(Debug)]
pub struct TraceTree {
    inner: GenericTree<SpanNode>,
    by_span_id: FxHashMap<String, NodeId>,
    /// Pre-zoom shallow children, keyed by the zoomed node; restored on
    /// zoom-out
    stash: FxHashMap<NodeId, Vec<NodeId>>,
    options: TraceOptions,
}

impl TraceTree {
    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Build from typed backend records. The flattened cache is materialized
    /// eagerly (the generic layer leaves it empty until first use).
    pub fn from_records(records: Vec<RawSpan>, options: TraceOptions) -> Self {
        let inner = if options.skip_hidden {
            GenericTree::from_roots(
                records,
                options.expand_all,
                Some(&skip_hidden_wrapper as &dyn Fn(&SpanNode) -> bool),
            )
        } else {
            GenericTree::from_roots(records, options.expand_all, None)
        };
        let mut tree = Self {
            inner,
            by_span_id: FxHashMap::default(),
            stash: FxHashMap::default(),
            options,
        };
        tree.inner.rebuild_flattened();
        for root in tree.inner.roots().to_vec() {
            tree.index_subtree(root);
        }
        tracing::debug!(
            nodes = tree.inner.len(),
            roots = tree.inner.roots().len(),
            "built trace tree"
        );
        tree
    }

    /// Build from an untyped JSON forest. Malformed input (non-array
    /// `children`, wrong scalar types) fails fast with no partial tree.
    pub fn from_value(value: JsonValue, options: TraceOptions) -> Result<Self, TreeError> {
        let records: Vec<RawSpan> =
            serde_json::from_value(value).map_err(|err| TreeError::malformed(err.to_string()))?;
        Ok(Self::from_records(records, options))
    }

    // ------------------------------------------------------------------------
    // Structure delegates
    // ------------------------------------------------------------------------

    /// The underlying generic tree (read-only; all mutation goes through the
    /// methods below).
    pub fn tree(&self) -> &GenericTree<SpanNode> {
        &self.inner
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<SpanNode>> {
        self.inner.get(id)
    }

    pub fn roots(&self) -> &[NodeId] {
        self.inner.roots()
    }

    pub fn flattened(&self) -> &[NodeId] {
        self.inner.flattened()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.inner.is_visible(id)
    }

    pub fn expanded_list(&self) -> Vec<NodeId> {
        self.inner.expanded_list()
    }

    pub fn node_by_span_id(&self, span_id: &str) -> Option<NodeId> {
        self.by_span_id.get(span_id).copied()
    }

    pub fn expand_node(
        &mut self,
        id: NodeId,
        expand: bool,
        options: ExpandOptions,
    ) -> Result<usize, TreeError> {
        self.inner.expand_node(id, expand, options)
    }

    pub fn sort_children_by<F>(&mut self, cmp: F)
    where
        F: FnMut(&SpanNode, &SpanNode) -> Ordering,
    {
        self.inner.sort_children_by(cmp);
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Collect every node matching the predicate via a full traversal,
    /// independent of the flattened cache. No mutation; safe at any time.
    pub fn find_all<F>(&self, pred: F) -> Vec<NodeId>
    where
        F: FnMut(&Node<SpanNode>) -> bool,
    {
        self.inner.find_all(pred)
    }

    /// Compile a filter query and collect every matching node.
    pub fn search(&self, query: &str) -> Result<Vec<NodeId>, QueryError> {
        let query = Query::parse(query)?;
        Ok(self.inner.find_all(|node| query.matches(node.payload())))
    }

    /// Every node with associated error/issue references.
    pub fn nodes_with_errors(&self) -> Vec<NodeId> {
        self.find_all(|node| node.payload().has_errors())
    }

    /// Every node in the given classification category.
    pub fn nodes_in_category(&self, category: SpanCategory) -> Vec<NodeId> {
        self.find_all(|node| node.payload().category == category)
    }

    // ------------------------------------------------------------------------
    // Zoom
    // ------------------------------------------------------------------------

    /// Start a zoom-in on a fetch-boundary node.
    ///
    /// Transitions `Idle|Resolved|Errored -> Fetching` and bumps the node's
    /// generation. Returns [`ZoomStart::InFlight`] instead of issuing a
    /// duplicate request while a fetch is outstanding.
    pub fn begin_zoom_in(&mut self, id: NodeId) -> Result<ZoomStart, TreeError> {
        self.inner.validate(id)?;
        let payload = self.inner.node(id).payload();
        if !payload.can_fetch {
            return Err(TreeError::NotFetchable {
                span_id: payload.span_id.clone(),
            });
        }
        if payload.fetch_status == FetchStatus::Fetching {
            tracing::debug!(span_id = %payload.span_id, "zoom fetch already in flight; coalescing");
            return Ok(ZoomStart::InFlight);
        }
        if payload.zoomed_in {
            return Ok(ZoomStart::AlreadyZoomed);
        }
        let target = FetchTarget {
            span_id: payload.span_id.clone(),
            project_slug: payload.project_slug.clone(),
            start_timestamp: payload.start_timestamp,
            timestamp: payload.timestamp,
        };
        let payload = self.inner.node_mut(id).payload_mut();
        payload.fetch_status = FetchStatus::Fetching;
        payload.fetch_seq += 1;
        let seq = payload.fetch_seq;
        tracing::debug!(span_id = %target.span_id, seq, "zoom fetch started");
        Ok(ZoomStart::Started(ZoomRequest { node: id, seq, target }))
    }

    /// Apply or discard a settled zoom fetch.
    ///
    /// A response whose ticket generation no longer matches the node's is
    /// stale (a later zoom call superseded it) and is discarded untouched:
    /// last-request-wins, not first-response-wins.
    pub fn finish_zoom_in(
        &mut self,
        request: &ZoomRequest,
        result: Result<Vec<RawSpan>, FetchError>,
    ) -> Result<ZoomOutcome, TreeError> {
        let id = request.node;
        match self.inner.validate(id) {
            Ok(()) => {}
            // The node itself was discarded while the fetch was in flight
            // (an ancestor zoomed out); the response has nowhere to land.
            Err(TreeError::DanglingNode { .. }) => return Ok(ZoomOutcome::Stale),
            Err(err) => return Err(err),
        }
        if self.inner.node(id).payload().fetch_seq != request.seq {
            tracing::warn!(span_id = %request.target.span_id, "stale zoom response discarded");
            return Ok(ZoomOutcome::Stale);
        }
        match result {
            Err(err) => {
                self.inner.node_mut(id).payload_mut().fetch_status = FetchStatus::Errored;
                tracing::warn!(
                    span_id = %request.target.span_id,
                    error = %err,
                    transient = err.is_transient(),
                    "zoom fetch failed"
                );
                Ok(ZoomOutcome::Errored)
            }
            Ok(records) => {
                // Replace, never duplicate: shallow children are stashed and
                // the fetched set takes their place.
                let stashed = self.inner.detach_children(id);
                for &child in &stashed {
                    self.unindex_subtree(child);
                }
                let grafted = self.graft(id, records);
                for &child in &grafted {
                    self.index_subtree(child);
                }
                self.stash.insert(id, stashed);
                let payload = self.inner.node_mut(id).payload_mut();
                payload.zoomed_in = true;
                payload.fetch_status = FetchStatus::Resolved;
                let (_, inserted) = self.inner.refresh_descendants(id);
                tracing::debug!(
                    span_id = %request.target.span_id,
                    grafted = grafted.len(),
                    inserted,
                    "zoom subtree grafted"
                );
                Ok(ZoomOutcome::Applied { inserted })
            }
        }
    }

    /// Collapse a grafted subtree and discard the fetched nodes entirely, so
    /// a later zoom re-fetches (memory/freshness trade-off; plain collapse
    /// via `expand_node` only hides). Restores the pre-zoom shallow children
    /// and stales any in-flight fetch on this node.
    pub fn zoom_out(&mut self, id: NodeId) -> Result<ZoomOutcome, TreeError> {
        self.inner.validate(id)?;
        let payload = self.inner.node_mut(id).payload_mut();
        payload.fetch_seq += 1;
        let was_fetching = payload.fetch_status == FetchStatus::Fetching;
        payload.fetch_status = FetchStatus::Idle;
        let span_id = payload.span_id.clone();
        if was_fetching {
            tracing::debug!(span_id = %span_id, "in-flight zoom cancelled");
        }
        if !self.inner.node(id).payload().zoomed_in {
            return Ok(ZoomOutcome::Unchanged);
        }
        self.inner.node_mut(id).payload_mut().zoomed_in = false;
        let grafted = self.inner.detach_children(id);
        for &child in &grafted {
            self.unindex_subtree(child);
            self.inner.discard_subtree(child);
        }
        let stashed = self.stash.remove(&id).unwrap_or_default();
        for &child in &stashed {
            self.index_subtree(child);
        }
        self.inner.attach_children(id, stashed);
        let (removed, _) = self.inner.refresh_descendants(id);
        tracing::debug!(
            span_id = %span_id,
            discarded = grafted.len(),
            removed,
            "zoom subtree discarded"
        );
        Ok(ZoomOutcome::Collapsed { removed })
    }

    /// One-call zoom for hosts that do not need the split-phase API.
    pub async fn zoom(
        &mut self,
        id: NodeId,
        zoom_in: bool,
        fetcher: &dyn SubtreeFetcher,
    ) -> Result<ZoomOutcome, TreeError> {
        if !zoom_in {
            return self.zoom_out(id);
        }
        let request = match self.begin_zoom_in(id)? {
            ZoomStart::Started(request) => request,
            ZoomStart::InFlight => return Ok(ZoomOutcome::Coalesced),
            ZoomStart::AlreadyZoomed => return Ok(ZoomOutcome::Unchanged),
        };
        let result = fetcher.fetch(request.target()).await;
        self.finish_zoom_in(&request, result)
    }

    // ------------------------------------------------------------------------
    // Index maintenance
    // ------------------------------------------------------------------------

    fn graft(&mut self, id: NodeId, records: Vec<RawSpan>) -> Vec<NodeId> {
        let expand_all = self.options.expand_all;
        if self.options.skip_hidden {
            self.inner.graft_records(
                id,
                records,
                expand_all,
                Some(&skip_hidden_wrapper as &dyn Fn(&SpanNode) -> bool),
            )
        } else {
            self.inner.graft_records(id, records, expand_all, None)
        }
    }

    fn index_subtree(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.inner.node(id);
            self.by_span_id.insert(node.payload().span_id.clone(), id);
            stack.extend(node.children().iter().copied());
        }
    }

    fn unindex_subtree(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.inner.node(id);
            self.by_span_id.remove(node.payload().span_id.as_str());
            stack.extend(node.children().iter().copied());
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
