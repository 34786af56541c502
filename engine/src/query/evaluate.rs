//! Typed comparison evaluation of filter tokens against node payloads
//!
//! Dispatch is on the runtime type of the field value looked up by the
//! clause key, not on a declared schema:
//!
//! - string: default and `=` are case-sensitive substring containment
//! - number: `>`, `>=`, `<`, `<=`, `=` with numeric coercion
//! - bool: `=` (explicit or default) against literal `true`/`false`
//! - null and undefined: two distinct literal keywords, never interchangeable
//! - missing key: clause is false unless negated
//!
//! Evaluation never errors for well-formed tokens; unrecognized keys simply
//! fail to match.

use super::parser::{QueryError, QueryOp, QueryToken, parse_query};
use super::value::{Attributed, TypedValue};

/// A compiled filter query: parsed once, evaluated per node during traversal.
#[derive(Debug, Clone)]
pub struct Query {
    tokens: Vec<QueryToken>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        Ok(Self {
            tokens: parse_query(input)?,
        })
    }

    pub fn tokens(&self) -> &[QueryToken] {
        &self.tokens
    }

    /// An empty query matches every node.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn matches(&self, payload: &dyn Attributed) -> bool {
        evaluate(payload, &self.tokens)
    }
}

/// Whether every token matches the payload (logical AND, no OR or grouping).
pub fn evaluate(payload: &dyn Attributed, tokens: &[QueryToken]) -> bool {
    tokens.iter().all(|token| evaluate_token(payload, token))
}

fn evaluate_token(payload: &dyn Attributed, token: &QueryToken) -> bool {
    let matched = match payload.get(&token.key) {
        // Undefined/missing: only the literal `undefined` keyword matches.
        None => {
            matches!(token.op, QueryOp::Default | QueryOp::Eq) && token.raw_value == "undefined"
        }
        Some(value) => match_value(&value, token),
    };
    matched != token.negated
}

#[allow(clippy::float_cmp)]
fn match_value(value: &TypedValue, token: &QueryToken) -> bool {
    match value {
        TypedValue::String(field) => match token.op {
            // `=` intentionally degrades to substring containment for
            // compatibility with query strings that rely on it.
            QueryOp::Default | QueryOp::Eq => field.contains(&token.raw_value),
            _ => false,
        },
        TypedValue::Number(field) => {
            let Ok(query) = token.raw_value.parse::<f64>() else {
                return false;
            };
            match token.op {
                QueryOp::Default | QueryOp::Eq => *field == query,
                QueryOp::Gt => *field > query,
                QueryOp::Gte => *field >= query,
                QueryOp::Lt => *field < query,
                QueryOp::Lte => *field <= query,
            }
        }
        TypedValue::Bool(field) => match token.op {
            QueryOp::Default | QueryOp::Eq => match token.raw_value.as_str() {
                "true" => *field,
                "false" => !*field,
                _ => false,
            },
            _ => false,
        },
        TypedValue::Null => {
            matches!(token.op, QueryOp::Default | QueryOp::Eq) && token.raw_value == "null"
        }
    }
}
