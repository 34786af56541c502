//! Filter query tokenizer
//!
//! A query is a whitespace-separated sequence of clauses; each clause is
//! `[!]key:[operator]value` with `operator` one of `>`, `>=`, `<`, `<=`, `=`,
//! or empty (default-for-type). A leading `!` negates the clause. All clauses
//! must hold for a node to match; there is no OR or grouping.
//!
//! Tokens are produced fresh per parse, immutable, and never persisted.

use thiserror::Error;

/// Parse failure for a filter query string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Clause has no `key:value` separator
    #[error("clause `{clause}` is missing a `:` separator")]
    MissingSeparator { clause: String },

    /// Clause key is empty
    #[error("clause `{clause}` has an empty key")]
    EmptyKey { clause: String },
}

/// Comparison operator of one clause.
///
/// `Default` resolves per field type at evaluation time: substring containment
/// for strings, equality for numbers and booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Default,
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl QueryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// One parsed `key:operator:value` clause
#[derive(Debug, Clone, PartialEq)]
pub struct QueryToken {
    pub key: String,
    pub op: QueryOp,
    pub raw_value: String,
    pub negated: bool,
}

/// Tokenize a filter query into clauses. Fails fast on malformed clauses.
pub fn parse_query(input: &str) -> Result<Vec<QueryToken>, QueryError> {
    input.split_whitespace().map(parse_clause).collect()
}

fn parse_clause(clause: &str) -> Result<QueryToken, QueryError> {
    let (negated, rest) = match clause.strip_prefix('!') {
        Some(stripped) => (true, stripped),
        None => (false, clause),
    };
    let Some((key, value)) = rest.split_once(':') else {
        return Err(QueryError::MissingSeparator {
            clause: clause.to_string(),
        });
    };
    if key.is_empty() {
        return Err(QueryError::EmptyKey {
            clause: clause.to_string(),
        });
    }
    let (op, raw_value) = if let Some(v) = value.strip_prefix(">=") {
        (QueryOp::Gte, v)
    } else if let Some(v) = value.strip_prefix("<=") {
        (QueryOp::Lte, v)
    } else if let Some(v) = value.strip_prefix('>') {
        (QueryOp::Gt, v)
    } else if let Some(v) = value.strip_prefix('<') {
        (QueryOp::Lt, v)
    } else if let Some(v) = value.strip_prefix('=') {
        (QueryOp::Eq, v)
    } else {
        (QueryOp::Default, value)
    };
    Ok(QueryToken {
        key: key.to_string(),
        op,
        raw_value: raw_value.to_string(),
        negated,
    })
}
