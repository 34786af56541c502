//! Tests for the trace tree: construction, indexing, zoom state machine,
//! grafting, and search

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use serde_json::{Map, json};

use crate::trace::ErrorRef;

use super::*;

fn span(id: &str, children: Vec<RawSpan>) -> RawSpan {
    RawSpan {
        span_id: id.to_string(),
        children,
        ..RawSpan::default()
    }
}

fn txn(id: &str, children: Vec<RawSpan>) -> RawSpan {
    RawSpan {
        span_id: id.to_string(),
        is_transaction: true,
        children,
        ..RawSpan::default()
    }
}

fn hidden_wrapper(id: &str, children: Vec<RawSpan>) -> RawSpan {
    let mut data = Map::new();
    data.insert("hidden".to_string(), json!(true));
    RawSpan {
        span_id: id.to_string(),
        data,
        children,
        ..RawSpan::default()
    }
}

fn build(records: Vec<RawSpan>) -> TraceTree {
    TraceTree::from_records(records, TraceOptions::default())
}

fn span_ids(tree: &TraceTree) -> Vec<String> {
    tree.flattened()
        .iter()
        .map(|&id| tree.get(id).unwrap().payload().span_id.clone())
        .collect()
}

fn started(start: ZoomStart) -> ZoomRequest {
    match start {
        ZoomStart::Started(request) => request,
        other => panic!("expected ZoomStart::Started, got {other:?}"),
    }
}

struct StaticFetcher {
    records: Vec<RawSpan>,
    fail: bool,
    calls: AtomicUsize,
}

impl StaticFetcher {
    fn returning(records: Vec<RawSpan>) -> Self {
        Self {
            records,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            records: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl SubtreeFetcher for StaticFetcher {
    async fn fetch(&self, _target: &FetchTarget) -> Result<Vec<RawSpan>, FetchError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail {
            Err(FetchError::transient("connection reset"))
        } else {
            Ok(self.records.clone())
        }
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[test]
fn from_records_materializes_flattened_eagerly() {
    let tree = build(vec![txn("T", vec![span("a", vec![]), span("b", vec![])])]);
    assert_eq!(span_ids(&tree), vec!["T", "a", "b"]);
    assert_eq!(tree.len(), 3);
}

#[test]
fn span_id_index_resolves_nodes() {
    let tree = build(vec![txn("T", vec![span("a", vec![span("b", vec![])])])]);
    let b = tree.node_by_span_id("b").unwrap();
    assert_eq!(tree.get(b).unwrap().payload().span_id, "b");
    assert_eq!(tree.get(b).unwrap().depth(), 2);
    assert!(tree.node_by_span_id("ghost").is_none());
}

#[test]
fn hidden_wrappers_are_elided_with_children_reparented() {
    let tree = build(vec![span(
        "A",
        vec![hidden_wrapper("w", vec![span("C", vec![])])],
    )]);
    assert_eq!(span_ids(&tree), vec!["A", "C"]);

    let c = tree.node_by_span_id("C").unwrap();
    assert_eq!(tree.get(c).unwrap().depth(), 1);
    assert!(tree.node_by_span_id("w").is_none());
}

#[test]
fn from_value_builds_a_tree() {
    let tree = TraceTree::from_value(
        json!([{"span_id": "r", "children": [{"span_id": "c", "children": []}]}]),
        TraceOptions::default(),
    )
    .unwrap();
    assert_eq!(span_ids(&tree), vec!["r", "c"]);
}

#[test]
fn from_value_rejects_malformed_children() {
    let err = TraceTree::from_value(
        json!([{"span_id": "bad", "children": {"oops": 1}}]),
        TraceOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TreeError::MalformedRecord { .. }));
}

// ============================================================================
// DELEGATES
// ============================================================================

#[test]
fn expand_and_sort_route_through_the_generic_tree() {
    let mut tree = TraceTree::from_records(
        vec![txn("T", vec![span("b", vec![]), span("a", vec![])])],
        TraceOptions {
            expand_all: false,
            skip_hidden: true,
        },
    );
    assert_eq!(span_ids(&tree), vec!["T"]);

    let t = tree.node_by_span_id("T").unwrap();
    tree.expand_node(t, true, ExpandOptions::default()).unwrap();
    assert_eq!(span_ids(&tree), vec!["T", "b", "a"]);

    tree.sort_children_by(|x, y| x.span_id.cmp(&y.span_id));
    assert_eq!(span_ids(&tree), vec!["T", "a", "b"]);
    assert_eq!(tree.flattened().to_vec(), tree.expanded_list());
}

// ============================================================================
// ZOOM
// ============================================================================

#[test]
fn zoom_grafts_fetched_subtree_after_the_node() {
    let mut tree = build(vec![txn("T", vec![]), span("tail", vec![])]);
    let t = tree.node_by_span_id("T").unwrap();

    let request = started(tree.begin_zoom_in(t).unwrap());
    assert_eq!(
        tree.get(t).unwrap().payload().fetch_status,
        FetchStatus::Fetching
    );
    assert_eq!(request.target().span_id, "T");

    let outcome = tree
        .finish_zoom_in(&request, Ok(vec![span("X", vec![]), span("Y", vec![])]))
        .unwrap();
    assert_eq!(outcome, ZoomOutcome::Applied { inserted: 2 });

    let payload = tree.get(t).unwrap().payload();
    assert!(payload.zoomed_in);
    assert_eq!(payload.fetch_status, FetchStatus::Resolved);
    assert_eq!(span_ids(&tree), vec!["T", "X", "Y", "tail"]);
    assert_eq!(tree.flattened().to_vec(), tree.expanded_list());
}

#[test]
fn zoom_on_collapsed_node_grafts_without_showing() {
    let mut tree = TraceTree::from_records(
        vec![txn("T", vec![])],
        TraceOptions {
            expand_all: false,
            skip_hidden: true,
        },
    );
    let t = tree.node_by_span_id("T").unwrap();

    let request = started(tree.begin_zoom_in(t).unwrap());
    let outcome = tree
        .finish_zoom_in(&request, Ok(vec![span("X", vec![])]))
        .unwrap();
    assert_eq!(outcome, ZoomOutcome::Applied { inserted: 0 });
    assert_eq!(span_ids(&tree), vec!["T"]);

    // The grafted child appears once the node is expanded.
    tree.expand_node(t, true, ExpandOptions::default()).unwrap();
    assert_eq!(span_ids(&tree), vec!["T", "X"]);
}

#[test]
fn zoom_on_plain_span_is_rejected() {
    let mut tree = build(vec![span("s", vec![])]);
    let s = tree.node_by_span_id("s").unwrap();
    let err = tree.begin_zoom_in(s).unwrap_err();
    assert!(matches!(err, TreeError::NotFetchable { .. }));
}

#[test]
fn concurrent_zoom_coalesces_onto_the_in_flight_request() {
    let mut tree = build(vec![txn("T", vec![])]);
    let t = tree.node_by_span_id("T").unwrap();

    let _request = started(tree.begin_zoom_in(t).unwrap());
    assert!(matches!(tree.begin_zoom_in(t).unwrap(), ZoomStart::InFlight));
}

#[test]
fn superseded_response_is_discarded_as_stale() {
    let mut tree = build(vec![txn("T", vec![span("shallow", vec![])])]);
    let t = tree.node_by_span_id("T").unwrap();

    let request = started(tree.begin_zoom_in(t).unwrap());
    // User toggles zoom off while the fetch is in flight.
    assert_eq!(tree.zoom_out(t).unwrap(), ZoomOutcome::Unchanged);

    let outcome = tree
        .finish_zoom_in(&request, Ok(vec![span("X", vec![])]))
        .unwrap();
    assert_eq!(outcome, ZoomOutcome::Stale);

    let payload = tree.get(t).unwrap().payload();
    assert!(!payload.zoomed_in);
    assert_eq!(payload.fetch_status, FetchStatus::Idle);
    assert!(tree.node_by_span_id("X").is_none());
    assert_eq!(span_ids(&tree), vec!["T", "shallow"]);
}

#[test]
fn failed_fetch_is_recorded_and_leaves_children_intact() {
    let mut tree = build(vec![txn("T", vec![span("shallow", vec![])])]);
    let t = tree.node_by_span_id("T").unwrap();

    let request = started(tree.begin_zoom_in(t).unwrap());
    let outcome = tree
        .finish_zoom_in(&request, Err(FetchError::transient("connection reset")))
        .unwrap();
    assert_eq!(outcome, ZoomOutcome::Errored);

    let payload = tree.get(t).unwrap().payload();
    assert_eq!(payload.fetch_status, FetchStatus::Errored);
    assert!(!payload.zoomed_in);
    assert_eq!(span_ids(&tree), vec!["T", "shallow"]);

    // No automatic retry, but the host may start a fresh zoom.
    assert!(matches!(tree.begin_zoom_in(t).unwrap(), ZoomStart::Started(_)));
}

#[test]
fn zoom_out_discards_grafted_nodes_and_restores_shallow_children() {
    let mut tree = build(vec![txn("T", vec![span("shallow", vec![])])]);
    let t = tree.node_by_span_id("T").unwrap();

    let request = started(tree.begin_zoom_in(t).unwrap());
    tree.finish_zoom_in(&request, Ok(vec![span("X", vec![span("X1", vec![])])]))
        .unwrap();
    let x = tree.node_by_span_id("X").unwrap();
    assert_eq!(span_ids(&tree), vec!["T", "X", "X1"]);
    // Shallow children are stashed while the graft is live.
    assert!(tree.node_by_span_id("shallow").is_none());

    let outcome = tree.zoom_out(t).unwrap();
    assert!(matches!(outcome, ZoomOutcome::Collapsed { .. }));
    assert_eq!(span_ids(&tree), vec!["T", "shallow"]);
    assert_eq!(tree.flattened().to_vec(), tree.expanded_list());

    // Fetched nodes are gone entirely, not hidden; handles dangle.
    assert!(tree.get(x).is_none());
    assert!(tree.node_by_span_id("X").is_none());
    assert!(!tree.get(t).unwrap().payload().zoomed_in);
}

#[test]
fn graft_replaces_shallow_children_without_duplicating() {
    let mut tree = build(vec![txn("T", vec![span("a", vec![])])]);
    let t = tree.node_by_span_id("T").unwrap();

    let request = started(tree.begin_zoom_in(t).unwrap());
    tree.finish_zoom_in(&request, Ok(vec![span("a", vec![span("c", vec![])])]))
        .unwrap();

    assert_eq!(span_ids(&tree), vec!["T", "a", "c"]);
    let a = tree.node_by_span_id("a").unwrap();
    assert_eq!(tree.get(a).unwrap().children().len(), 1);
}

#[tokio::test]
async fn async_zoom_roundtrip_refetches_after_zoom_out() {
    let fetcher = StaticFetcher::returning(vec![span("X", vec![])]);
    let mut tree = build(vec![txn("T", vec![])]);
    let t = tree.node_by_span_id("T").unwrap();

    let outcome = tree.zoom(t, true, &fetcher).await.unwrap();
    assert_eq!(outcome, ZoomOutcome::Applied { inserted: 1 });
    assert_eq!(fetcher.call_count(), 1);

    // Zooming an already-grafted node does not refetch.
    assert_eq!(tree.zoom(t, true, &fetcher).await.unwrap(), ZoomOutcome::Unchanged);
    assert_eq!(fetcher.call_count(), 1);

    // Zoom-out discards, so zooming back in fetches again.
    assert!(matches!(
        tree.zoom(t, false, &fetcher).await.unwrap(),
        ZoomOutcome::Collapsed { .. }
    ));
    let outcome = tree.zoom(t, true, &fetcher).await.unwrap();
    assert_eq!(outcome, ZoomOutcome::Applied { inserted: 1 });
    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test]
async fn async_zoom_records_fetch_failure() {
    let fetcher = StaticFetcher::failing();
    let mut tree = build(vec![txn("T", vec![])]);
    let t = tree.node_by_span_id("T").unwrap();

    let outcome = tree.zoom(t, true, &fetcher).await.unwrap();
    assert_eq!(outcome, ZoomOutcome::Errored);
    assert_eq!(
        tree.get(t).unwrap().payload().fetch_status,
        FetchStatus::Errored
    );
}

// ============================================================================
// SEARCH
// ============================================================================

fn timed_span(id: &str, op: &str, start: f64, end: f64) -> RawSpan {
    RawSpan {
        span_id: id.to_string(),
        op: Some(op.to_string()),
        start_timestamp: start,
        timestamp: end,
        ..RawSpan::default()
    }
}

#[test]
fn search_matches_typed_fields() {
    let tree = build(vec![txn(
        "T",
        vec![
            timed_span("1a3", "db.query", 1000.0, 1001.0),
            timed_span("zzz", "http.client", 999.0, 1002.0),
        ],
    )]);

    let hits = tree.search("start_timestamp:>=1000").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(tree.get(hits[0]).unwrap().payload().span_id, "1a3");

    let hits = tree.search("!span_id:1a3").unwrap();
    let ids: Vec<&str> = hits
        .iter()
        .map(|&id| tree.get(id).unwrap().payload().span_id.as_str())
        .collect();
    assert_eq!(ids, vec!["T", "zzz"]);

    let hits = tree.search("op:db duration:<=1").unwrap();
    assert_eq!(hits.len(), 1);

    assert!(tree.search("no-separator").is_err());
}

#[test]
fn search_is_independent_of_the_visible_window() {
    let tree = TraceTree::from_records(
        vec![txn("T", vec![timed_span("deep", "db.query", 0.0, 1.0)])],
        TraceOptions {
            expand_all: false,
            skip_hidden: true,
        },
    );
    // `deep` is hidden behind the collapsed root but still searchable.
    assert_eq!(span_ids(&tree), vec!["T"]);
    assert_eq!(tree.search("op:db").unwrap().len(), 1);
}

#[test]
fn error_and_category_collectors() {
    let mut flaky = span("flaky", vec![]);
    flaky.errors.push(ErrorRef {
        event_id: "e1".to_string(),
        title: Some("boom".to_string()),
        level: Some("error".to_string()),
    });
    let tree = build(vec![txn(
        "T",
        vec![flaky, timed_span("gen", "ai.run", 0.0, 1.0)],
    )]);

    let errored = tree.nodes_with_errors();
    assert_eq!(errored.len(), 1);
    assert_eq!(tree.get(errored[0]).unwrap().payload().span_id, "flaky");

    let llm = tree.nodes_in_category(SpanCategory::Llm);
    assert_eq!(llm.len(), 1);
    assert_eq!(tree.get(llm[0]).unwrap().payload().span_id, "gen");
}
