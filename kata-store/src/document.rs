//! Document and query model for the remote store boundary.
//!
//! Both backing stores are generic document stores: collections of JSON
//! documents addressed by string keys. The distinction between the
//! user-private store and the shared multi-tenant store matters only for
//! which collection names are queried, never for protocol shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Collection names used across both stores.
pub mod collections {
    /// Primary store: identity profiles.
    pub const PROFILES: &str = "profiles";
    /// Primary store: denormalized composite cache for offline reads.
    pub const COMPOSITE_PROFILES: &str = "composite_profiles";
    /// Secondary store: training programs.
    pub const PROGRAMS: &str = "programs";
    /// Secondary store: enrollments.
    pub const ENROLLMENTS: &str = "enrollments";
    /// Secondary store: append-only progress entries.
    pub const PROGRESS_ENTRIES: &str = "progress_entries";
    /// Secondary store: per-rank completion rows.
    pub const RANK_PROGRESS: &str = "rank_progress";
    /// Secondary store: subscriptions.
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    /// Secondary store: studio memberships.
    pub const STUDIO_MEMBERSHIPS: &str = "studio_memberships";
}

/// A stored document: string key plus JSON field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Comparison operator for a query predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateOp {
    /// Field equals value.
    Eq,
    /// Field is strictly greater than value; used for cursor pagination.
    Gt,
    /// String field contains the value as a case-insensitive substring.
    Contains,
    /// Array field contains the value as an element.
    ArrayContains,
}

/// A single field predicate. Queries AND all predicates together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub op: PredicateOp,
    pub value: Value,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: PredicateOp::Eq,
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: PredicateOp::Gt,
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: PredicateOp::Contains,
            value: value.into(),
        }
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: PredicateOp::ArrayContains,
            value: value.into(),
        }
    }

    /// Evaluate this predicate against a document's field map.
    pub fn matches(&self, fields: &Value) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.op {
            PredicateOp::Eq => actual == &self.value,
            PredicateOp::Gt => compare_values(actual, &self.value) == Ordering::Greater,
            PredicateOp::Contains => match (actual.as_str(), self.value.as_str()) {
                (Some(haystack), Some(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            PredicateOp::ArrayContains => actual
                .as_array()
                .map(|items| items.contains(&self.value))
                .unwrap_or(false),
        }
    }
}

/// Sort directive for query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Total-order comparison over JSON scalars: numbers by value, strings
/// lexicographically, mixed or non-scalar values compare equal.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
