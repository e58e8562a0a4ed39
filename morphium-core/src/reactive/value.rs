//! Values read from and written to tracked nodes.

use serde_json::Value as JsonValue;

use super::tracked::Tracked;
use crate::graph::is_composite;

/// A slot's content as seen by callers.
///
/// Reads through a tracked node never hand out an untracked composite: the
/// first read wraps it and every later read returns the same [`Tracked`]
/// handle. `Plain` composites appear only when working with plain data, for
/// example as the input of `Store::wrap` or a path lookup on plain JSON.
#[derive(Debug, Clone)]
pub enum Value {
    /// Scalar data, or a composite that is not tracked.
    Plain(JsonValue),
    /// A tracked node.
    Node(Tracked),
}

impl Value {
    /// Whether this value is an object or an array, tracked or not.
    pub fn is_composite(&self) -> bool {
        match self {
            Value::Plain(value) => is_composite(value),
            Value::Node(_) => true,
        }
    }

    /// Whether this value is a tracked node.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn as_node(&self) -> Option<&Tracked> {
        match self {
            Value::Node(node) => Some(node),
            Value::Plain(_) => None,
        }
    }

    pub fn into_node(self) -> Option<Tracked> {
        match self {
            Value::Node(node) => Some(node),
            Value::Plain(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Plain(value) => Some(value),
            Value::Node(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(JsonValue::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(JsonValue::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(JsonValue::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(JsonValue::as_bool)
    }

    /// Plain deep copy of the value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Plain(value) => value.clone(),
            Value::Node(node) => node.to_json(),
        }
    }
}

/// Plain values compare structurally, tracked nodes by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Plain(a), Value::Plain(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

/// Structural comparison against plain JSON; tracked nodes compare by snapshot.
impl PartialEq<JsonValue> for Value {
    fn eq(&self, other: &JsonValue) -> bool {
        match self {
            Value::Plain(value) => value == other,
            Value::Node(node) => node.to_json() == *other,
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Plain(value)
    }
}

impl From<Tracked> for Value {
    fn from(node: Tracked) -> Self {
        Value::Node(node)
    }
}

impl From<&Tracked> for Value {
    fn from(node: &Tracked) -> Self {
        Value::Node(node.clone())
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Plain(JsonValue::from(value))
                }
            }
        )*
    };
}

impl_from_scalar!(bool, i32, i64, u32, u64, f64, &str, String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde_json::json;

    #[test]
    fn scalars_convert_to_plain() {
        assert_eq!(Value::from(5), Value::Plain(json!(5)));
        assert_eq!(Value::from("x"), json!("x"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(!Value::from(1.5).is_composite());
    }

    #[test]
    fn nodes_compare_by_identity() {
        let store = Store::new();
        let a = store.wrap(json!({ "k": 1 })).unwrap();
        let b = store.wrap(json!({ "k": 1 })).unwrap();

        assert_eq!(Value::from(&a), Value::from(a.clone()));
        assert_ne!(Value::from(&a), Value::from(&b));
        // Structural comparison is still available against JSON
        assert_eq!(Value::from(&b), json!({ "k": 1 }));
    }

    #[test]
    fn composite_detection() {
        let store = Store::new();
        assert!(Value::from(json!([])).is_composite());
        assert!(!Value::from(json!(null)).is_composite());
        assert!(Value::from(store.wrap(json!({})).unwrap()).is_tracked());
    }
}
