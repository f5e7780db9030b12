//! Value semantics shared by the evaluator and templates.
//!
//! Values are plain `serde_json::Value`s. Truthiness and comparisons follow
//! the conventions workflow designers expect from condition languages:
//! empty containers and zero are false, numbers compare numerically
//! regardless of integer/float representation.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{ExprResult, ExpressionError};

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Equality with numeric normalisation (`1 == 1.0`).
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`; only numbers with numbers and strings
/// with strings are ordered.
pub fn compare(left: &Value, right: &Value) -> ExprResult<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y)
                .ok_or_else(|| ExpressionError::Evaluation("numbers are not comparable".into()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExpressionError::Evaluation(format!(
            "cannot order {} and {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

/// Membership test for `in` / `not in`.
pub fn contains(container: &Value, item: &Value) -> ExprResult<bool> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|x| values_equal(x, item))),
        Value::String(text) => match item {
            Value::String(needle) => Ok(text.contains(needle.as_str())),
            other => Err(ExpressionError::Evaluation(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(other)
            ))),
        },
        Value::Object(map) => match item {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(ExpressionError::Evaluation(format!(
            "argument of type {} is not iterable",
            type_name(other)
        ))),
    }
}

/// Identity test for `is` / `is not`: same type and same value, without
/// numeric normalisation.
pub fn is_identical(left: &Value, right: &Value) -> bool {
    left == right
}

/// Look up a literal key in a container.
pub fn subscript(target: &Value, key: &Value) -> ExprResult<Value> {
    let missing = || ExpressionError::Evaluation(format!("key {key} not found"));
    match (target, key) {
        (Value::Object(map), Value::String(k)) => map.get(k).cloned().ok_or_else(missing),
        (Value::Array(items), Value::Number(n)) => {
            let index = n.as_i64().ok_or_else(missing)?;
            let len = items.len() as i64;
            let index = if index < 0 { len + index } else { index };
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(missing)
        }
        (Value::String(text), Value::Number(n)) => {
            let index = n.as_i64().ok_or_else(missing)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| text.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(missing)
        }
        _ => Err(ExpressionError::Evaluation(format!(
            "{} is not subscriptable with {}",
            type_name(target),
            type_name(key)
        ))),
    }
}

/// Text form used by templates: `None` renders empty, strings render raw.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        other => other.to_string(),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
