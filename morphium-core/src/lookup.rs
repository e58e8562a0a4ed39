//! Path Lookup
//!
//! Resolve a [`Path`] against a tracked node or plain JSON. Lookups through
//! tracked nodes behave like ordinary reads, so composites met along the way
//! come back as tracked handles.

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::path::{Key, Path};
use crate::reactive::Value;

/// Walk `path` from `root`.
///
/// The empty path returns `root` itself (for a tracked root, a handle equal
/// to it). Fails with [`Error::InvalidArgument`] when `root` is not a
/// composite and with [`Error::PathNotFound`] when a step names a missing key
/// or passes through a scalar.
pub fn get(root: &Value, path: &Path) -> Result<Value> {
    if !root.is_composite() {
        return Err(Error::invalid_argument(format!(
            "Invalid object provided: {}",
            root.to_json()
        )));
    }

    let mut current = root.clone();
    for key in path {
        let next = match &current {
            Value::Node(node) => node.get(key),
            Value::Plain(value) => plain_child(value, key).map(Value::Plain),
        };
        current = next.ok_or_else(|| Error::path_not_found(path, &root.to_json()))?;
    }
    Ok(current)
}

fn plain_child(value: &JsonValue, key: &Key) -> Option<JsonValue> {
    match value {
        JsonValue::Object(map) => map.get(&key.clone().into_field()).cloned(),
        JsonValue::Array(items) if key.is_length() => Some(JsonValue::from(items.len())),
        JsonValue::Array(items) => items.get(key.as_index()?).cloned(),
        _ => None,
    }
}
