//! Filter evaluation for live query subscriptions
//!
//! A filter is a JSON object mapping field names to either a literal
//! (equality) or an operator map (`$eq`, `$neq`, `$gt`, `$gte`, `$lt`,
//! `$lte`). The reserved key `$or` holds a list of sub-filters of which at
//! least one must match. All keys must hold (implicit AND).
//!
//! Evaluation never errors: anything unexpected (type mismatch, unknown
//! operator, malformed `$or`, excessive nesting) is treated as no match.

use serde_json::{Map, Number, Value as JsonValue};
use skyfeed_commons::constants::FILTER_OR;
use std::cmp::Ordering;

/// Maximum `$or` nesting depth before a filter is rejected
const MAX_FILTER_DEPTH: usize = 64;

/// Evaluate `filter` against `doc`.
///
/// `doc` is either a single document (object) or a sequence of documents,
/// in which case every element must be an object matching the filter. An
/// empty sequence matches.
#[inline]
pub fn matches(filter: &JsonValue, doc: &JsonValue) -> bool {
    let Some(filter) = filter.as_object() else {
        return false;
    };
    evaluate_candidate(filter, doc, 0)
}

fn evaluate_candidate(filter: &Map<String, JsonValue>, doc: &JsonValue, depth: usize) -> bool {
    match doc {
        JsonValue::Object(fields) => evaluate_object(filter, fields, depth),
        JsonValue::Array(items) => items.iter().all(|item| match item {
            JsonValue::Object(fields) => evaluate_object(filter, fields, depth),
            _ => false,
        }),
        _ => false,
    }
}

fn evaluate_object(
    filter: &Map<String, JsonValue>,
    doc: &Map<String, JsonValue>,
    depth: usize,
) -> bool {
    if depth > MAX_FILTER_DEPTH {
        return false;
    }

    filter.iter().all(|(key, condition)| {
        if key == FILTER_OR {
            return evaluate_or(condition, doc, depth);
        }

        let Some(value) = doc.get(key) else {
            return false;
        };

        match condition {
            JsonValue::Object(operators) => evaluate_operators(operators, value),
            literal => literal_equals(literal, value),
        }
    })
}

/// `$or` is evaluated against the original candidate document, never against
/// the sibling keys of the filter.
fn evaluate_or(condition: &JsonValue, doc: &Map<String, JsonValue>, depth: usize) -> bool {
    let Some(branches) = condition.as_array() else {
        return false;
    };

    branches.iter().any(|branch| match branch {
        JsonValue::Object(sub) => evaluate_object(sub, doc, depth + 1),
        _ => false,
    })
}

/// Plain literal equality. Composite literals never match.
fn literal_equals(literal: &JsonValue, value: &JsonValue) -> bool {
    match (Kind::of(literal), Kind::of(value)) {
        (Kind::Array, _) | (Kind::Object, _) => false,
        (a, b) if a != b => false,
        _ => literal == value,
    }
}

fn evaluate_operators(operators: &Map<String, JsonValue>, value: &JsonValue) -> bool {
    if operators.is_empty() {
        return false;
    }

    operators.iter().all(|(operator, operand)| {
        // no coercion across types
        if Kind::of(operand) != Kind::of(value) {
            return false;
        }

        match operator.as_str() {
            "$eq" => scalar_equals(value, operand),
            "$neq" => Kind::of(value).is_scalar() && !scalar_equals(value, operand),
            "$gt" => compare(value, operand) == Some(Ordering::Greater),
            "$gte" => matches!(compare(value, operand), Some(Ordering::Greater | Ordering::Equal)),
            "$lt" => compare(value, operand) == Some(Ordering::Less),
            "$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
            _ => false,
        }
    })
}

fn scalar_equals(value: &JsonValue, operand: &JsonValue) -> bool {
    Kind::of(value).is_scalar() && value == operand
}

/// Ordering for `$gt`/`$gte`/`$lt`/`$lte`; defined only for strings, integers
/// and floats of the same kind.
fn compare(value: &JsonValue, operand: &JsonValue) -> Option<Ordering> {
    match (value, operand) {
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (JsonValue::Number(a), JsonValue::Number(b)) => match (Kind::of(value), Kind::of(operand)) {
            (Kind::Int, Kind::Int) => Some(as_i128(a)?.cmp(&as_i128(b)?)),
            (Kind::Float, Kind::Float) => a.as_f64()?.partial_cmp(&b.as_f64()?),
            _ => None,
        },
        _ => None,
    }
}

fn as_i128(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

/// Dynamic type of a JSON value; integers and floats are distinct kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
}

impl Kind {
    fn of(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Kind::Null,
            JsonValue::Bool(_) => Kind::Bool,
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Kind::Int,
            JsonValue::Number(_) => Kind::Float,
            JsonValue::String(_) => Kind::String,
            JsonValue::Array(_) => Kind::Array,
            JsonValue::Object(_) => Kind::Object,
        }
    }

    fn is_scalar(self) -> bool {
        !matches!(self, Kind::Array | Kind::Object)
    }
}
