//! Step guards evaluated against the running workflow context.
//!
//! Supported forms, where `path` is a dotted lookup such as
//! `step_load.columns.revenue.mean` (numeric segments index arrays):
//!
//! - `path`            truthy
//! - `!path`           falsy
//! - `path == value`   equal
//! - `path != value`   not equal
//!
//! `value` is parsed as JSON when possible (`42`, `true`, `"x"`), otherwise
//! taken as a bare string with surrounding quotes stripped.

use serde_json::{Map, Value};

pub fn evaluate(expr: &str, context: &Map<String, Value>) -> bool {
    let expr = expr.trim();

    if let Some((path, rhs)) = expr.split_once("!=") {
        return !equals(lookup(context, path.trim()), &literal(rhs));
    }
    if let Some((path, rhs)) = expr.split_once("==") {
        return equals(lookup(context, path.trim()), &literal(rhs));
    }
    if let Some(path) = expr.strip_prefix('!') {
        return !truthy(lookup(context, path.trim()));
    }
    truthy(lookup(context, expr))
}

fn lookup<'a>(context: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

fn literal(raw: &str) -> Value {
    let raw = raw.trim();
    serde_json::from_str(raw)
        .unwrap_or_else(|_| Value::String(raw.trim_matches(|c| c == '\'' || c == '"').to_string()))
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(a), b) => a == b,
    }
}
