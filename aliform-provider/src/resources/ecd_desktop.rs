//! ecd_desktop: a cloud desktop
//!
//! A desktop in status `Deleted` is still listed for a while and is treated
//! as gone.

use std::collections::HashMap;
use std::time::Duration;

use aliform_core::differ::diff_tags;
use aliform_core::provider::ResourceType;
use aliform_core::resource::{Resource, State, Value};
use async_trait::async_trait;
use serde_json::json;

use super::{Attributes, EcdDesktop, ResourceHandler, Timeouts, check_force_new};
use crate::client::{AliyunClient, ECD};
use crate::error::Result;
use crate::extract::{get_path, value_to_string};
use crate::request::{AttrMapping, RpcRequest};
use crate::retry::ApiCall;
use crate::services::ecd::{EcdService, payment_type};
use crate::utils::read_attributes;
use crate::waiter::{Refreshed, StateWaiter, WaitTarget};

const RUNNING: &str = "Running";
const DELETED: &str = "Deleted";
const FAIL_STATUSES: &[&str] = &["Expired", DELETED];

const CREATE_FIELDS: &[AttrMapping] = &[
    ("office_site_id", "OfficeSiteId"),
    ("policy_group_id", "PolicyGroupId"),
    ("bundle_id", "BundleId"),
    ("desktop_name", "DesktopName"),
    ("host_name", "Hostname"),
    ("user_assign_mode", "UserAssignMode"),
    ("end_user_ids", "EndUserId"),
    ("period", "Period"),
    ("period_unit", "PeriodUnit"),
    ("auto_pay", "AutoPay"),
    ("auto_renew", "AutoRenew"),
    ("root_disk_size_gib", "RootDiskSizeGib"),
    ("user_disk_size_gib", "UserDiskSizeGib"),
];

const READ_FIELDS: &[AttrMapping] = &[
    ("office_site_id", "OfficeSiteId"),
    ("policy_group_id", "PolicyGroupId"),
    ("desktop_name", "DesktopName"),
    ("desktop_type", "DesktopType"),
    ("end_user_ids", "EndUserIds"),
    ("status", "DesktopStatus"),
];

const FORCE_NEW: &[&str] = &["office_site_id", "bundle_id", "user_assign_mode", "end_user_ids"];

/// Charge type sent to the API for a configured payment type
fn charge_type(payment_type: &str) -> &str {
    match payment_type {
        "PayAsYouGo" => "PostPaid",
        "Subscription" => "PrePaid",
        other => other,
    }
}

/// Desktop status refresh where a `Deleted` desktop counts as absent
async fn refresh_desktop(service: &EcdService<'_>, id: &str) -> Result<Refreshed> {
    Ok(service
        .desktop_status(id)
        .await?
        .filter(|(_, status)| status != DELETED))
}

impl EcdDesktop {
    async fn wait_running(
        &self,
        service: &EcdService<'_>,
        id: &str,
        timeout: Duration,
    ) -> Result<()> {
        StateWaiter::new(id, WaitTarget::reached(&[RUNNING]), timeout)
            .fail_on(FAIL_STATUSES)
            .wait(|| refresh_desktop(service, id))
            .await?;
        Ok(())
    }

    async fn send(
        &self,
        client: &AliyunClient,
        id: &str,
        action: &str,
        request: RpcRequest,
    ) -> Result<()> {
        let call = ApiCall::new(ECD, action, request).timeout(self.timeouts().update);
        call.send(client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;
        Ok(())
    }
}

#[async_trait]
impl ResourceHandler for EcdDesktop {
    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 30, 30)
    }

    async fn create(&self, client: &AliyunClient, resource: &Resource) -> Result<String> {
        let mut request = RpcRequest::with_region(&client.region_id);
        request.map_attributes(resource, CREATE_FIELDS).set("Amount", 1);
        if let Some(payment) = resource.get_str("payment_type") {
            request.set("ChargeType", charge_type(payment));
        }

        let call = ApiCall::new(ECD, "CreateDesktops", request).timeout(self.timeouts().create);
        let response = call
            .send(client)
            .await
            .map_err(|e| e.with_action(self.name(), call.action()))?;
        let id = get_path(&response, "$.DesktopId[0]")
            .map(value_to_string)
            .map_err(|e| e.with_action(self.name(), call.action()))?;
        log::info!("Created ECD desktop {}", id);

        let service = EcdService::new(client);
        self.wait_running(&service, &id, self.timeouts().create).await?;

        let tags = resource.get_string_map("tags");
        if !tags.is_empty() {
            service.set_resource_tags(&id, &diff_tags(&HashMap::new(), &tags)).await?;
        }
        Ok(id)
    }

    async fn read(&self, client: &AliyunClient, id: &str) -> Result<Option<Attributes>> {
        let service = EcdService::new(client);
        let object = match service.describe_desktop(id).await {
            Ok(object) => object,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        if object.get("DesktopStatus").and_then(serde_json::Value::as_str) == Some(DELETED) {
            return Ok(None);
        }

        let mut attributes = read_attributes(&object, READ_FIELDS);
        if let Some(charge) = object.get("ChargeType").map(value_to_string) {
            attributes.insert(
                "payment_type".to_string(),
                Value::String(payment_type(&charge).to_string()),
            );
        }
        let tags = service
            .list_tags(id)
            .await?
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        attributes.insert("tags".to_string(), Value::Map(tags));
        Ok(Some(attributes))
    }

    async fn update(
        &self,
        client: &AliyunClient,
        id: &str,
        from: &State,
        to: &Resource,
    ) -> Result<()> {
        check_force_new(from, to, FORCE_NEW)?;
        let service = EcdService::new(client);
        let timeout = self.timeouts().update;
        let changed_to = |key: &str| {
            to.get_str(key).filter(|desired| {
                from.attributes.get(key).and_then(Value::as_str) != Some(*desired)
            })
        };

        if let Some(name) = changed_to("desktop_name") {
            let mut request = RpcRequest::with_region(&client.region_id);
            request.set("DesktopId", id).set("NewDesktopName", name);
            self.send(client, id, "ModifyDesktopName", request).await?;
        }

        if let Some(policy_group_id) = changed_to("policy_group_id") {
            let mut request = RpcRequest::with_region(&client.region_id);
            request
                .set("DesktopId", json!([id]))
                .set("PolicyGroupId", policy_group_id);
            self.send(client, id, "ModifyDesktopsPolicyGroup", request).await?;
        }

        if let Some(desktop_type) = changed_to("desktop_type") {
            let mut request = RpcRequest::with_region(&client.region_id);
            request.set("DesktopId", id).set("DesktopType", desktop_type);
            self.send(client, id, "ModifyDesktopSpec", request).await?;
            StateWaiter::new(id, WaitTarget::reached(&[desktop_type]), timeout)
                .wait(|| service.desktop_type(id))
                .await?;
        }

        if let Some(payment) = changed_to("payment_type") {
            let mut request = RpcRequest::with_region(&client.region_id);
            request
                .set("DesktopId", json!([id]))
                .set("ChargeType", charge_type(payment))
                .set_opt("Period", to.get_int("period"))
                .set_opt("PeriodUnit", to.get_str("period_unit"));
            self.send(client, id, "ModifyDesktopChargeType", request).await?;
            StateWaiter::new(id, WaitTarget::reached(&[payment]), timeout)
                .wait(|| service.desktop_payment_type(id))
                .await?;
        }

        let diff = diff_tags(&from.get_string_map("tags"), &to.get_string_map("tags"));
        if !diff.is_empty() {
            service.set_resource_tags(id, &diff).await?;
        }
        Ok(())
    }

    async fn delete(&self, client: &AliyunClient, id: &str) -> Result<()> {
        let mut request = RpcRequest::with_region(&client.region_id);
        request.set("DesktopId", json!([id]));
        let call = ApiCall::new(ECD, "DeleteDesktops", request).timeout(self.timeouts().delete);
        match call.send(client).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.with_action(id, call.action())),
        }

        let service = EcdService::new(client);
        StateWaiter::new(id, WaitTarget::Deleted, self.timeouts().delete)
            .wait(|| refresh_desktop(&service, id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aliform_core::resource::ResourceId;
    use serde_json::json;

    use super::*;
    use crate::error::AlicloudError;
    use crate::testing::mock_client;

    fn desktop(status: &str) -> serde_json::Value {
        json!({"Desktops": [{
            "DesktopId": "ecd-1",
            "DesktopName": "web",
            "OfficeSiteId": "cn-hangzhou+dir-1",
            "PolicyGroupId": "pg-1",
            "DesktopType": "eds.general.2c4g",
            "ChargeType": "PostPaid",
            "EndUserIds": ["alice"],
            "DesktopStatus": status
        }]})
    }

    fn state(attributes: Vec<(&str, Value)>) -> State {
        State::existing(
            ResourceId::new("ecd_desktop", "web"),
            attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_running_then_tags() {
        let (client, transport) = mock_client();
        transport.respond("CreateDesktops", json!({"DesktopId": ["ecd-1"], "OrderId": "o-1"}));
        transport.respond("DescribeDesktops", desktop("Pending"));
        transport.respond("DescribeDesktops", desktop("Running"));
        transport.respond("TagResources", json!({}));

        let resource = Resource::new("ecd_desktop", "web")
            .with_attribute("office_site_id", "cn-hangzhou+dir-1")
            .with_attribute("policy_group_id", "pg-1")
            .with_attribute("bundle_id", "b-1")
            .with_attribute("payment_type", "PayAsYouGo")
            .with_attribute("end_user_ids", Value::List(vec![Value::from("alice")]))
            .with_attribute(
                "tags",
                Value::Map(HashMap::from([("env".to_string(), Value::from("dev"))])),
            );
        let id = EcdDesktop.create(&client, &resource).await.unwrap();

        assert_eq!(id, "ecd-1");
        assert_eq!(
            transport.actions(),
            vec!["CreateDesktops", "DescribeDesktops", "DescribeDesktops", "TagResources"]
        );
        let create = &transport.calls_for("CreateDesktops")[0];
        assert_eq!(create.body["ChargeType"], "PostPaid");
        assert_eq!(create.body["EndUserId.1"], "alice");
        assert_eq!(create.body["Amount"], "1");
        let tag = &transport.calls_for("TagResources")[0];
        assert_eq!(tag.body["ResourceId.1"], "ecd-1");
        assert_eq!(tag.body["Tag.1.Key"], "env");
    }

    #[tokio::test(start_paused = true)]
    async fn create_fails_when_desktop_expires() {
        let (client, transport) = mock_client();
        transport.respond("CreateDesktops", json!({"DesktopId": ["ecd-1"]}));
        transport.respond("DescribeDesktops", desktop("Expired"));

        let resource = Resource::new("ecd_desktop", "web").with_attribute("bundle_id", "b-1");
        let err = EcdDesktop.create(&client, &resource).await.unwrap_err();

        assert!(matches!(
            err,
            AlicloudError::FailedToReachTargetStatus { ref status, .. } if status == "Expired"
        ));
    }

    #[tokio::test]
    async fn read_includes_payment_type_and_tags() {
        let (client, transport) = mock_client();
        transport.respond("DescribeDesktops", desktop("Running"));
        transport.respond(
            "ListTagResources",
            json!({"TagResources": [
                {"TagKey": "env", "TagValue": "dev"},
                {"TagKey": "acs:rm:rgId", "TagValue": "rg-1"}
            ]}),
        );

        let attributes = EcdDesktop.read(&client, "ecd-1").await.unwrap().unwrap();

        assert_eq!(attributes["desktop_name"], Value::from("web"));
        assert_eq!(attributes["payment_type"], Value::from("PayAsYouGo"));
        assert_eq!(attributes["end_user_ids"], Value::List(vec![Value::from("alice")]));
        assert_eq!(
            attributes["tags"],
            Value::Map(HashMap::from([("env".to_string(), Value::from("dev"))]))
        );
    }

    #[tokio::test]
    async fn deleted_desktop_reads_as_gone() {
        let (client, transport) = mock_client();
        transport.respond("DescribeDesktops", desktop("Deleted"));

        assert!(EcdDesktop.read(&client, "ecd-1").await.unwrap().is_none());
        assert!(transport.calls_for("ListTagResources").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn update_renames_moves_policy_and_retags() {
        let (client, transport) = mock_client();
        transport.respond("ModifyDesktopName", json!({}));
        transport.respond("ModifyDesktopsPolicyGroup", json!({}));
        transport.respond("UntagResources", json!({}));

        let from = state(vec![
            ("desktop_name", Value::from("web")),
            ("policy_group_id", Value::from("pg-1")),
            ("desktop_type", Value::from("eds.general.2c4g")),
            (
                "tags",
                Value::Map(HashMap::from([("env".to_string(), Value::from("dev"))])),
            ),
        ]);
        let to = Resource::new("ecd_desktop", "web")
            .with_attribute("desktop_name", "web-2")
            .with_attribute("policy_group_id", "pg-2");

        EcdDesktop.update(&client, "ecd-1", &from, &to).await.unwrap();

        assert_eq!(
            transport.actions(),
            vec!["ModifyDesktopName", "ModifyDesktopsPolicyGroup", "UntagResources"]
        );
        let rename = &transport.calls_for("ModifyDesktopName")[0];
        assert_eq!(rename.body["NewDesktopName"], "web-2");
        let policy = &transport.calls_for("ModifyDesktopsPolicyGroup")[0];
        assert_eq!(policy.body["DesktopId.1"], "ecd-1");
        assert_eq!(policy.body["PolicyGroupId"], "pg-2");
        assert_eq!(transport.calls_for("UntagResources")[0].body["TagKey.1"], "env");
    }

    #[tokio::test(start_paused = true)]
    async fn payment_change_waits_for_new_charge_type() {
        let (client, transport) = mock_client();
        transport.respond("ModifyDesktopChargeType", json!({}));
        transport.respond("DescribeDesktops", desktop("Running"));
        let mut prepaid = desktop("Running");
        prepaid["Desktops"][0]["ChargeType"] = json!("PrePaid");
        transport.respond("DescribeDesktops", prepaid);

        let from = state(vec![("payment_type", Value::from("PayAsYouGo"))]);
        let to = Resource::new("ecd_desktop", "web")
            .with_attribute("payment_type", "Subscription")
            .with_attribute("period", Value::Int(1))
            .with_attribute("period_unit", "Month");

        EcdDesktop.update(&client, "ecd-1", &from, &to).await.unwrap();

        let modify = &transport.calls_for("ModifyDesktopChargeType")[0];
        assert_eq!(modify.body["ChargeType"], "PrePaid");
        assert_eq!(modify.body["Period"], "1");
        assert_eq!(modify.body["PeriodUnit"], "Month");
        assert_eq!(transport.calls_for("DescribeDesktops").len(), 2);
    }

    #[tokio::test]
    async fn moving_office_site_is_rejected() {
        let (client, transport) = mock_client();
        let from = state(vec![("office_site_id", Value::from("cn-hangzhou+dir-1"))]);
        let to = Resource::new("ecd_desktop", "web")
            .with_attribute("office_site_id", "cn-hangzhou+dir-2");

        let err = EcdDesktop.update(&client, "ecd-1", &from, &to).await.unwrap_err();

        assert!(matches!(err, AlicloudError::Unsupported(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_deleted_status() {
        let (client, transport) = mock_client();
        transport.respond("DeleteDesktops", json!({}));
        transport.respond("DescribeDesktops", desktop("Stopping"));
        transport.respond("DescribeDesktops", desktop("Deleted"));

        EcdDesktop.delete(&client, "ecd-1").await.unwrap();

        assert_eq!(transport.calls_for("DeleteDesktops")[0].body["DesktopId.1"], "ecd-1");
        assert_eq!(transport.calls_for("DescribeDesktops").len(), 2);
    }
}
