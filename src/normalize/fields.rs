// src/normalize/fields.rs
//! Small accessors over `serde_json::Value` shared by the normalizer.

use serde_json::{Map, Value};

pub(crate) fn as_object(v: &Value) -> Option<&Map<String, Value>> {
    v.as_object()
}

/// First key whose value is a non-blank string, trimmed.
pub(crate) fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Key presence only; the value may be anything, including null.
pub(crate) fn has_any_key(obj: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|k| obj.contains_key(*k))
}

/// JS-style truthiness, used to decide whether a container key is worth walking.
pub(crate) fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Depth-first visit of every object reachable from `value`.
///
/// The callback sees each object before its children; arrays are transparent.
pub(crate) fn walk_objects<'a, F>(value: &'a Value, visit: &mut F)
where
    F: FnMut(&'a Map<String, Value>),
{
    match value {
        Value::Array(items) => {
            for item in items {
                walk_objects(item, visit);
            }
        }
        Value::Object(map) => {
            visit(map);
            for nested in map.values() {
                walk_objects(nested, visit);
            }
        }
        _ => {}
    }
}
