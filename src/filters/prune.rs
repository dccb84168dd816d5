//! Recursive removal of empty containers and null leaves

use serde_json::{Map, Value};

/// Remove emptiness from a JSON value.
///
/// - empty arrays are dropped
/// - objects are pruned bottom-up, then dropped if no keys remain
/// - null leaves are dropped
/// - a value that ends up wholly empty becomes `null`
///
/// Non-empty arrays are kept as they are: only object members are recursed into.
pub fn prune(value: &Value) -> Value {
    prune_value(value).unwrap_or(Value::Null)
}

/// `None` means "drop this member".
fn prune_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .iter()
                .filter_map(|(key, child)| prune_value(child).map(|v| (key.clone(), v)))
                .collect();
            // emptiness is checked after recursion, not on the original shape
            (!pruned.is_empty()).then_some(Value::Object(pruned))
        }
        other => Some(other.clone()),
    }
}
