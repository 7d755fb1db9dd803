//! Conversion helpers between resource values and API JSON

use std::collections::HashMap;

use aliform_core::resource::Value;
use serde_json::json;

/// Convert a resource value to its JSON representation
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => json!(s),
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Convert an API JSON value to a resource value
///
/// `null` has no counterpart and yields `None`; nulls inside containers are dropped.
pub fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(|f| Value::Int(f as i64))
            }
        }
        serde_json::Value::Array(arr) => {
            Some(Value::List(arr.iter().filter_map(json_to_value).collect()))
        }
        serde_json::Value::Object(obj) => Some(Value::Map(
            obj.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}

/// Copy fields of an API object onto resource attributes
///
/// Each mapping is `(attribute name, API field name)`; absent or null fields are skipped.
pub fn read_attributes(
    object: &serde_json::Value,
    mappings: &[(&'static str, &'static str)],
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    for (attr_name, api_name) in mappings {
        if let Some(value) = object.get(*api_name).and_then(json_to_value) {
            attributes.insert(attr_name.to_string(), value);
        }
    }
    attributes
}
