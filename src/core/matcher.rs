//! Purpose: Decide whether a record's payload contains a query string.
//! Exports: `PayloadQuery`, `matches`, `DEFAULT_MAX_DEPTH`.
//! Role: Pure predicate used by the search accumulator.
//! Invariants: Matching is case-insensitive substring containment on strings only.
//! Invariants: Numbers, booleans, and null never match (no coercion to text).
//! Invariants: Nesting beyond the depth ceiling never matches, so recursion is bounded.
use crate::core::record::Payload;
use serde_json::Value;

pub const DEFAULT_MAX_DEPTH: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadQuery {
    needle: String,
    field: Option<String>,
    max_depth: usize,
}

impl PayloadQuery {
    pub fn new(text: &str) -> Self {
        Self {
            needle: text.to_lowercase(),
            field: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Restricts matching to one top-level payload key.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        match &self.field {
            Some(field) => payload
                .get(field)
                .is_some_and(|value| self.matches_value(value, 1)),
            None => payload.values().any(|value| self.matches_value(value, 1)),
        }
    }

    fn matches_value(&self, value: &Value, depth: usize) -> bool {
        if depth > self.max_depth {
            return false;
        }
        match value {
            Value::String(text) => text.to_lowercase().contains(&self.needle),
            Value::Object(map) => map
                .values()
                .any(|value| self.matches_value(value, depth + 1)),
            Value::Array(items) => items
                .iter()
                .any(|value| self.matches_value(value, depth + 1)),
            Value::Number(_) | Value::Bool(_) | Value::Null => false,
        }
    }
}

pub fn matches(payload: &Payload, query: &str, field: Option<&str>) -> bool {
    let query = match field {
        Some(field) => PayloadQuery::new(query).with_field(field),
        None => PayloadQuery::new(query),
    };
    query.matches(payload)
}
