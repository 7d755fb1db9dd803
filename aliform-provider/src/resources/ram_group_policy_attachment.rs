//! ram_group_policy_attachment: a policy attached to a RAM group
//!
//! Every attribute is part of the identifier, so there is nothing to update.

use std::collections::HashMap;

use aliform_core::provider::ResourceType;
use aliform_core::resource::{Resource, State, Value};
use async_trait::async_trait;

use super::{Attributes, RamGroupPolicyAttachment, ResourceHandler, Timeouts, required_str};
use crate::client::{AliyunClient, RAM};
use crate::error::{AlicloudError, Result};
use crate::retry::{ApiCall, IncrementalWait};
use crate::services::ram::{GroupPolicyAttachmentId, RamService};
use crate::utils::json_to_value;

/// Detach errors meaning the attachment is already gone
const ALREADY_DETACHED: &[&str] = &["EntityNotExist.Group", "EntityNotExist.Group.Policy"];

const ATTACHMENT_WAIT: IncrementalWait = IncrementalWait::secs(3, 5);

#[async_trait]
impl ResourceHandler for RamGroupPolicyAttachment {
    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 0, 5)
    }

    async fn create(&self, client: &AliyunClient, resource: &Resource) -> Result<String> {
        let id = GroupPolicyAttachmentId::new(
            required_str(resource, "policy_name")?,
            required_str(resource, "policy_type")?,
            required_str(resource, "group_name")?,
        );

        let call = ApiCall::new(RAM, "AttachPolicyToGroup", id.request())
            .timeout(self.timeouts().create)
            .wait(ATTACHMENT_WAIT)
            .autoretry(true);
        call.send(client)
            .await
            .map_err(|e| e.with_action(self.name(), call.action()))?;

        Ok(id.to_string())
    }

    async fn read(&self, client: &AliyunClient, id: &str) -> Result<Option<Attributes>> {
        let attachment = GroupPolicyAttachmentId::parse(id)?;
        let policy = match RamService::new(client).describe_group_policy_attachment(id).await {
            Ok(policy) => policy,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut attributes = HashMap::new();
        let fields = [("policy_name", "PolicyName"), ("policy_type", "PolicyType")];
        for (attr_name, api_name) in fields {
            if let Some(value) = policy.get(api_name).and_then(json_to_value) {
                attributes.insert(attr_name.to_string(), value);
            }
        }
        attributes.insert("group_name".to_string(), Value::String(attachment.group_name));
        Ok(Some(attributes))
    }

    async fn update(
        &self,
        _client: &AliyunClient,
        id: &str,
        _from: &State,
        _to: &Resource,
    ) -> Result<()> {
        Err(AlicloudError::Unsupported(format!(
            "{} {} cannot be updated in place, the attachment must be replaced",
            self.name(),
            id
        )))
    }

    async fn delete(&self, client: &AliyunClient, id: &str) -> Result<()> {
        let attachment = GroupPolicyAttachmentId::parse(id)?;

        let call = ApiCall::new(RAM, "DetachPolicyFromGroup", attachment.request())
            .timeout(self.timeouts().delete)
            .wait(ATTACHMENT_WAIT)
            .autoretry(true);
        match call.send(client).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_expected(ALREADY_DETACHED) || err.is_not_found() => {
                log::debug!("{} {} was already detached", self.name(), id);
                Ok(())
            }
            Err(err) => Err(err.with_action(id, call.action())),
        }
    }
}
