//! Resource Access Management (RAM) service

use std::fmt;

use serde_json::Value;

use crate::client::{AliyunClient, RAM};
use crate::error::{AlicloudError, Result};
use crate::extract::{items_at, value_to_string};
use crate::request::RpcRequest;
use crate::retry::ApiCall;

/// Identifier of a policy attached to a group: `group:<policy>:<type>:<group>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPolicyAttachmentId {
    pub policy_name: String,
    pub policy_type: String,
    pub group_name: String,
}

impl GroupPolicyAttachmentId {
    pub fn new(
        policy_name: impl Into<String>,
        policy_type: impl Into<String>,
        group_name: impl Into<String>,
    ) -> Self {
        Self {
            policy_name: policy_name.into(),
            policy_type: policy_type.into(),
            group_name: group_name.into(),
        }
    }

    pub fn parse(id: &str) -> Result<Self> {
        match id.split(':').collect::<Vec<_>>().as_slice() {
            ["group", policy_name, policy_type, group_name] => {
                Ok(Self::new(*policy_name, *policy_type, *group_name))
            }
            _ => Err(AlicloudError::InvalidId {
                id: id.to_string(),
                expected: "group:<policy_name>:<policy_type>:<group_name>".to_string(),
            }),
        }
    }

    /// Request naming the policy and the group, as taken by attach and detach
    pub fn request(&self) -> RpcRequest {
        let mut request = RpcRequest::new();
        request
            .set("PolicyType", self.policy_type.as_str())
            .set("PolicyName", self.policy_name.as_str())
            .set("GroupName", self.group_name.as_str());
        request
    }
}

impl fmt::Display for GroupPolicyAttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "group:{}:{}:{}",
            self.policy_name, self.policy_type, self.group_name
        )
    }
}

pub struct RamService<'a> {
    client: &'a AliyunClient,
}

impl<'a> RamService<'a> {
    pub fn new(client: &'a AliyunClient) -> Self {
        Self { client }
    }

    /// Find the attached policy among the policies of the group
    pub async fn describe_group_policy_attachment(&self, id: &str) -> Result<Value> {
        let attachment = GroupPolicyAttachmentId::parse(id)?;

        let mut request = RpcRequest::new();
        request.set("GroupName", attachment.group_name.as_str());
        let call = ApiCall::new(RAM, "ListPoliciesForGroup", request).autoretry(true);
        let response = call
            .send(self.client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;

        items_at(&response, "$.Policies.Policy")
            .map_err(|e| e.with_action(id, call.action()))?
            .into_iter()
            .find(|policy| {
                let field = |name: &str| policy.get(name).map(value_to_string);
                field("PolicyName").as_deref() == Some(attachment.policy_name.as_str())
                    && field("PolicyType").as_deref() == Some(attachment.policy_type.as_str())
            })
            .ok_or_else(|| AlicloudError::not_found("GroupPolicyAttachment", id))
    }
}
