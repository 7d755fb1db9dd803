//! ecd_policy_group: desktop access policy with access and security rules
//!
//! Rules are set-typed blocks. New rules ride along with the modify call,
//! removed rules are revoked beforehand in calls of their own.

use aliform_core::differ::{diff_set_attribute, has_change};
use aliform_core::provider::ResourceType;
use aliform_core::resource::{Resource, State, Value};
use async_trait::async_trait;
use serde_json::json;

use super::{Attributes, EcdPolicyGroup, ResourceHandler};
use crate::client::{AliyunClient, ECD};
use crate::error::Result;
use crate::extract::{get_path, value_to_string};
use crate::request::{AttrMapping, RpcRequest};
use crate::retry::ApiCall;
use crate::services::ecd::{
    ACCESS_RULE_FIELDS, EcdService, POLICY_STATUS_MODIFICATION, SECURITY_RULE_FIELDS,
    authorize_access_policy_rules, authorize_security_policy_rules,
};
use crate::utils::{read_attributes, value_to_json};

const ACCESS_RULES: &str = "authorize_access_policy_rules";
const SECURITY_RULES: &str = "authorize_security_policy_rules";

/// Scalar settings, sent as-is on create and when changed on update
const POLICY_FIELDS: &[AttrMapping] = &[
    ("policy_group_name", "Name"),
    ("clipboard", "Clipboard"),
    ("local_drive", "LocalDrive"),
    ("usb_redirect", "UsbRedirect"),
    ("watermark", "Watermark"),
    ("watermark_type", "WatermarkType"),
    ("watermark_transparency", "WatermarkTransparency"),
    ("visual_quality", "VisualQuality"),
    ("html_access", "Html5Access"),
    ("html_file_transfer", "Html5FileTransfer"),
    ("domain_list", "DomainList"),
    ("recording", "Recording"),
    ("camera_redirect", "CameraRedirect"),
];

/// Rule blocks of a describe response, keyed by attribute name
fn read_rules(object: &serde_json::Value, api_name: &str, fields: &[AttrMapping]) -> Value {
    let rules = object
        .get(api_name)
        .and_then(serde_json::Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .map(|rule| Value::Map(read_attributes(rule, fields)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Value::List(rules)
}

#[async_trait]
impl ResourceHandler for EcdPolicyGroup {
    async fn create(&self, client: &AliyunClient, resource: &Resource) -> Result<String> {
        let mut request = RpcRequest::with_region(&client.region_id);
        request.map_attributes(resource, POLICY_FIELDS);
        authorize_access_policy_rules(&mut request, resource.get_list(ACCESS_RULES));
        authorize_security_policy_rules(&mut request, resource.get_list(SECURITY_RULES));

        let call = ApiCall::new(ECD, "CreatePolicyGroup", request).timeout(self.timeouts().create);
        let response = call
            .send(client)
            .await
            .map_err(|e| e.with_action(self.name(), call.action()))?;
        get_path(&response, "$.PolicyGroupId")
            .map(value_to_string)
            .map_err(|e| e.with_action(self.name(), call.action()))
    }

    async fn read(&self, client: &AliyunClient, id: &str) -> Result<Option<Attributes>> {
        let object = match EcdService::new(client).describe_policy_group(id).await {
            Ok(object) => object,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut attributes = read_attributes(&object, POLICY_FIELDS);
        if let Some(status) = object.get("PolicyStatus") {
            attributes.insert("status".to_string(), Value::String(value_to_string(status)));
        }
        attributes.insert(
            ACCESS_RULES.to_string(),
            read_rules(&object, "AuthorizeAccessPolicyRules", ACCESS_RULE_FIELDS),
        );
        attributes.insert(
            SECURITY_RULES.to_string(),
            read_rules(&object, "AuthorizeSecurityPolicyRules", SECURITY_RULE_FIELDS),
        );
        Ok(Some(attributes))
    }

    async fn update(
        &self,
        client: &AliyunClient,
        id: &str,
        from: &State,
        to: &Resource,
    ) -> Result<()> {
        let timeout = self.timeouts().update;
        let service = EcdService::new(client);
        let access = diff_set_attribute(from, to, ACCESS_RULES);
        let security = diff_set_attribute(from, to, SECURITY_RULES);

        service.revoke_access_policy_rules(id, &access.removed, timeout).await?;
        service.revoke_security_policy_rules(id, &security.removed, timeout).await?;

        let mut request = RpcRequest::with_region(&client.region_id);
        request.set("PolicyGroupId", id);
        let mut changed = !access.added.is_empty() || !security.added.is_empty();
        for (attr_name, api_name) in POLICY_FIELDS {
            if has_change(from, to, attr_name)
                && let Some(value) = to.get_ok(attr_name)
            {
                request.set(*api_name, value_to_json(value));
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }
        authorize_access_policy_rules(&mut request, &access.added);
        authorize_security_policy_rules(&mut request, &security.added);

        let call = ApiCall::new(ECD, "ModifyPolicyGroup", request)
            .timeout(timeout)
            .retry_on(&[POLICY_STATUS_MODIFICATION]);
        call.send(client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;
        Ok(())
    }

    async fn delete(&self, client: &AliyunClient, id: &str) -> Result<()> {
        let mut request = RpcRequest::with_region(&client.region_id);
        request.set("PolicyGroupId", json!([id]));
        let call = ApiCall::new(ECD, "DeletePolicyGroups", request)
            .timeout(self.timeouts().delete)
            .retry_on(&[POLICY_STATUS_MODIFICATION]);
        match call.send(client).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.with_action(id, call.action())),
        }
    }
}
