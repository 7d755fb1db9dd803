//! Tag differ/applier
//!
//! Tag changes are applied with two separate calls: `UntagResources` for keys
//! that disappeared, then `TagResources` for new and changed keys. System
//! tags owned by the cloud are never removed.

use std::collections::HashMap;
use std::time::Duration;

use aliform_core::differ::TagDiff;
use serde_json::{Value, json};

use crate::client::{AliyunClient, Product};
use crate::error::Result;
use crate::extract::{list_at, value_to_string};
use crate::request::RpcRequest;
use crate::retry::{ApiCall, IncrementalWait};

/// Prefixes of tag keys reserved by the cloud
const SYSTEM_TAG_PREFIXES: &[&str] = &["aliyun", "acs:", "http://", "https://"];

pub fn is_system_tag(key: &str) -> bool {
    SYSTEM_TAG_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// How a tag API names the tagged resource and the tag entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagIdStyle {
    /// `ResourceId.1`, `TagKey.N`, `Tag.N.Key` / `Tag.N.Value`
    Indexed,
    /// `ResourceIds` list, `TagKeys` list, `Tags` list of `{Key, Value}`
    List,
}

/// Tag API of one product and resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagApi {
    pub product: Product,
    pub resource_type: &'static str,
    pub id_style: TagIdStyle,
    pub timeout: Duration,
    pub wait: IncrementalWait,
}

impl TagApi {
    pub const fn new(product: Product, resource_type: &'static str, id_style: TagIdStyle) -> Self {
        Self {
            product,
            resource_type,
            id_style,
            timeout: Duration::from_secs(10 * 60),
            wait: IncrementalWait::secs(2, 1),
        }
    }

    fn request(&self, client: &AliyunClient, id: &str) -> RpcRequest {
        let mut request = RpcRequest::with_region(&client.region_id);
        if !self.resource_type.is_empty() {
            request.set("ResourceType", self.resource_type);
        }
        match self.id_style {
            TagIdStyle::Indexed => request.set_indexed("ResourceId", [id]),
            TagIdStyle::List => request.set("ResourceIds", json!([id])),
        };
        request
    }

    fn call(&self, action: &str, request: RpcRequest) -> ApiCall {
        ApiCall::new(self.product, action, request)
            .timeout(self.timeout)
            .wait(self.wait)
    }
}

/// Apply a tag diff to one resource
///
/// Removal runs first so a failed tagging call never leaves stale keys
/// behind a successful one.
pub async fn set_resource_tags(
    client: &AliyunClient,
    api: &TagApi,
    id: &str,
    diff: &TagDiff,
) -> Result<()> {
    let removed: Vec<&str> = diff
        .removed
        .iter()
        .map(String::as_str)
        .filter(|key| !is_system_tag(key))
        .collect();

    if !removed.is_empty() {
        let mut request = api.request(client, id);
        match api.id_style {
            TagIdStyle::Indexed => request.set_indexed("TagKey", removed.iter().copied()),
            TagIdStyle::List => request.set("TagKeys", json!(removed)),
        };
        let call = api.call("UntagResources", request);
        call.send(client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;
        log::debug!("Removed tags {:?} from {}", removed, id);
    }

    if !diff.added.is_empty() {
        let mut request = api.request(client, id);
        match api.id_style {
            TagIdStyle::Indexed => {
                for (index, (key, value)) in diff.added.iter().enumerate() {
                    request
                        .set(format!("Tag.{}.Key", index + 1), key.as_str())
                        .set(format!("Tag.{}.Value", index + 1), value.as_str());
                }
            }
            TagIdStyle::List => {
                let tags: Vec<Value> = diff
                    .added
                    .iter()
                    .map(|(key, value)| json!({"Key": key, "Value": value}))
                    .collect();
                request.set("Tags", tags);
            }
        }
        let call = api.call("TagResources", request);
        call.send(client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;
        log::debug!("Applied {} tag(s) to {}", diff.added.len(), id);
    }

    Ok(())
}

/// List every tag entry of one resource, following `NextToken`
pub async fn list_tag_resources(
    client: &AliyunClient,
    api: &TagApi,
    id: &str,
    path: &str,
) -> Result<Vec<Value>> {
    let mut entries = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let mut request = api.request(client, id);
        request.set_opt("NextToken", next_token.take());
        let call = ApiCall::new(api.product, "ListTagResources", request);
        let response = call
            .send(client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;

        entries.extend(list_at(&response, path));

        match response.get("NextToken").map(value_to_string) {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(entries)
}

/// Collect tag entries into a map, skipping system tags
///
/// Accepts both `{TagKey, TagValue}` and `{Key, Value}` entries.
pub fn tags_to_map(entries: &[Value]) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for entry in entries {
        let key = entry.get("TagKey").or_else(|| entry.get("Key"));
        let value = entry.get("TagValue").or_else(|| entry.get("Value"));
        if let Some(key) = key.map(value_to_string)
            && !is_system_tag(&key)
        {
            tags.insert(key, value.map(value_to_string).unwrap_or_default());
        }
    }
    tags
}
