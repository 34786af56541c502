//! Typed values and attribute lookup
//!
//! The evaluator never inspects payload structs directly; payloads expose
//! their queryable fields through the [`Attributed`] capability trait as
//! [`TypedValue`]s, so the per-type comparison dispatch is exhaustive and
//! checked at compile time.

use serde_json::Value as JsonValue;

/// Tagged union of field values a query can compare against.
///
/// An absent field is modeled as `None` at the lookup site, distinct from
/// `TypedValue::Null`: a field that is undefined does not match a query for
/// `null` and vice versa.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl TypedValue {
    /// Convert a JSON scalar. Arrays and objects are not queryable and map to
    /// `None` (undefined).
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Self::Null),
            JsonValue::Bool(b) => Some(Self::Bool(*b)),
            JsonValue::Number(n) => n.as_f64().map(Self::Number),
            JsonValue::String(s) => Some(Self::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Null => "null",
        }
    }
}

/// Capability interface for payloads that expose queryable fields.
///
/// `None` means the field is undefined on this payload; every comparison
/// against it fails except the literal `undefined` keyword.
pub trait Attributed {
    fn get(&self, key: &str) -> Option<TypedValue>;
}
