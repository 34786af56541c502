//! Span payloads and classification
//!
//! `RawSpan` is the backend record shape (only `children` has a required
//! structure; everything else is optional or defaulted). `SpanNode` is the
//! tree payload derived from it, carrying classification and zoom state.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::query::{Attributed, TypedValue};
use crate::tree::RawRecord;

// ============================================================================
// CLASSIFICATION ENUMS
// ============================================================================

/// Structural role of a node in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Transaction boundary; candidate for zooming into a deeper subtree
    Transaction,
    #[default]
    Span,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Span => "span",
        }
    }
}

/// High-level classification derived from the span `op` prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanCategory {
    Llm,
    Tool,
    Agent,
    Db,
    Http,
    Ui,
    #[default]
    Other,
}

impl SpanCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Agent => "agent",
            Self::Db => "db",
            Self::Http => "http",
            Self::Ui => "ui",
            Self::Other => "other",
        }
    }

    /// Classify from the dotted `op` prefix (`http.server` -> `Http`).
    pub fn from_op(op: Option<&str>) -> Self {
        let Some(op) = op else {
            return Self::Other;
        };
        let prefix = op.split('.').next().unwrap_or(op);
        match prefix {
            "ai" | "gen_ai" | "llm" => Self::Llm,
            "tool" => Self::Tool,
            "agent" => Self::Agent,
            "db" | "cache" => Self::Db,
            "http" | "rpc" => Self::Http,
            "ui" | "browser" | "pageload" | "navigation" | "resource" => Self::Ui,
            _ => Self::Other,
        }
    }
}

/// Per-node state machine for an in-flight or completed zoom fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Fetching,
    Resolved,
    Errored,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Resolved => "resolved",
            Self::Errored => "errored",
        }
    }
}

// ============================================================================
// RAW RECORDS
// ============================================================================

/// Reference to an error/issue event attached to a span
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorRef {
    pub event_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

/// Raw backend record for one span.
///
/// Only `children` has a required shape (a sequence); no other constraints
/// are imposed on the record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpan {
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_timestamp: f64,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub is_transaction: bool,
    /// Whether a deeper subtree can be fetched for this node; defaults to
    /// `is_transaction` when absent
    #[serde(default)]
    pub can_fetch: Option<bool>,
    #[serde(default)]
    pub project_slug: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorRef>,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
    #[serde(default)]
    pub children: Vec<RawSpan>,
}

// ============================================================================
// TREE PAYLOAD
// ============================================================================

/// Tree payload for one span/transaction node.
#[derive(Debug, Clone)]
pub struct SpanNode {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub op: Option<String>,
    pub description: Option<String>,
    /// Timing window `[start_timestamp, timestamp)` in seconds
    pub start_timestamp: f64,
    pub timestamp: f64,
    pub kind: SpanKind,
    pub category: SpanCategory,
    pub project_slug: Option<String>,
    pub errors: Vec<ErrorRef>,
    /// Opaque attribute bag; queryable through [`Attributed`]
    pub data: Map<String, JsonValue>,
    pub can_fetch: bool,
    pub fetch_status: FetchStatus,
    /// Whether a deeper, separately-fetched subtree is currently grafted.
    /// Distinct from the node's expansion flag: zoom controls what is loaded,
    /// expand controls what is shown.
    pub zoomed_in: bool,
    /// Generation counter for last-request-wins staleness detection
    pub(crate) fetch_seq: u64,
}

impl SpanNode {
    pub fn duration(&self) -> f64 {
        self.timestamp - self.start_timestamp
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Synthetic wrapper records are marked with `hidden: true` in the
    /// attribute bag and elided at build time (children reparented).
    pub fn is_hidden_wrapper(&self) -> bool {
        self.data.get("hidden") == Some(&JsonValue::Bool(true))
    }
}

impl RawRecord for RawSpan {
    type Payload = SpanNode;

    fn into_parts(self) -> (SpanNode, Vec<RawSpan>) {
        let kind = if self.is_transaction {
            SpanKind::Transaction
        } else {
            SpanKind::Span
        };
        let payload = SpanNode {
            category: SpanCategory::from_op(self.op.as_deref()),
            can_fetch: self.can_fetch.unwrap_or(self.is_transaction),
            kind,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            op: self.op,
            description: self.description,
            start_timestamp: self.start_timestamp,
            timestamp: self.timestamp,
            project_slug: self.project_slug,
            errors: self.errors,
            data: self.data,
            fetch_status: FetchStatus::Idle,
            zoomed_in: false,
            fetch_seq: 0,
        };
        (payload, self.children)
    }
}

impl Attributed for SpanNode {
    fn get(&self, key: &str) -> Option<TypedValue> {
        match key {
            "span_id" => Some(TypedValue::String(self.span_id.clone())),
            "parent_span_id" => self.parent_span_id.clone().map(TypedValue::String),
            "op" => self.op.clone().map(TypedValue::String),
            "description" => self.description.clone().map(TypedValue::String),
            "start_timestamp" => Some(TypedValue::Number(self.start_timestamp)),
            "timestamp" => Some(TypedValue::Number(self.timestamp)),
            "duration" => Some(TypedValue::Number(self.duration())),
            "kind" => Some(TypedValue::String(self.kind.as_str().to_string())),
            "category" => Some(TypedValue::String(self.category.as_str().to_string())),
            "fetch_status" => Some(TypedValue::String(self.fetch_status.as_str().to_string())),
            "has_errors" => Some(TypedValue::Bool(self.has_errors())),
            "zoomed_in" => Some(TypedValue::Bool(self.zoomed_in)),
            _ => self.data.get(key).and_then(TypedValue::from_json),
        }
    }
}
