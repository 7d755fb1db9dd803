//! Request builder - Flat key/value RPC requests from resource attributes
//!
//! Values are kept as JSON until the request is sent; `flatten` then expands
//! lists and nested objects into the `Key.N` / `Key.N.Field` form the RPC
//! style APIs expect.

use std::collections::BTreeMap;

use aliform_core::resource::{Resource, Value};

use crate::utils::value_to_json;

/// Attribute mapping: (attribute name, API parameter name)
pub type AttrMapping = (&'static str, &'static str);

/// Request parameters for one RPC action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcRequest {
    params: BTreeMap<String, serde_json::Value>,
}

impl RpcRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request pre-populated with `RegionId`
    pub fn with_region(region: &str) -> Self {
        let mut request = Self::new();
        request.set("RegionId", region);
        request
    }

    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> &mut Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn set_opt<V: Into<serde_json::Value>>(
        &mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.params.insert(key.into(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.params.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Copy every configured attribute under its API name
    ///
    /// Absent attributes and empty values are skipped, so optional settings
    /// are only sent when the user gave them.
    pub fn map_attributes(&mut self, resource: &Resource, mappings: &[AttrMapping]) -> &mut Self {
        for (attr_name, api_name) in mappings {
            if let Some(value) = resource.get_ok(attr_name) {
                self.params.insert(api_name.to_string(), value_to_json(value));
            }
        }
        self
    }

    /// Set `Prefix.1`, `Prefix.2`, ... from a list of scalars
    pub fn set_indexed<I, V>(&mut self, prefix: &str, items: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        for (index, item) in items.into_iter().enumerate() {
            self.params
                .insert(format!("{}.{}", prefix, index + 1), item.into());
        }
        self
    }

    /// Set `Prefix.N.Field` from a list of map-valued blocks
    ///
    /// Fields missing from a block are left out; numbering follows the block order.
    pub fn set_indexed_objects(
        &mut self,
        prefix: &str,
        objects: &[Value],
        fields: &[AttrMapping],
    ) -> &mut Self {
        for (index, object) in objects.iter().enumerate() {
            let Some(map) = object.as_map() else {
                continue;
            };
            for (attr_name, api_name) in fields {
                if let Some(value) = map.get(*attr_name).filter(|v| !v.is_empty()) {
                    self.params.insert(
                        format!("{}.{}.{}", prefix, index + 1, api_name),
                        value_to_json(value),
                    );
                }
            }
        }
        self
    }

    /// Expand into the flat string parameters sent on the wire
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        for (key, value) in &self.params {
            flatten_into(&mut flat, key, value);
        }
        flat
    }
}

fn flatten_into(flat: &mut BTreeMap<String, String>, key: &str, value: &serde_json::Value) {
    match value {
        serde_json::Value::Null => {}
        serde_json::Value::String(s) => {
            flat.insert(key.to_string(), s.clone());
        }
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
            flat.insert(key.to_string(), value.to_string());
        }
        serde_json::Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(flat, &format!("{}.{}", key, index + 1), item);
            }
        }
        serde_json::Value::Object(fields) => {
            for (field, item) in fields {
                flatten_into(flat, &format!("{}.{}", key, field), item);
            }
        }
    }
}
