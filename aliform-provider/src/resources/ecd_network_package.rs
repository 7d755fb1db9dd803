//! ecd_network_package: internet access bandwidth of an ECD office site

use aliform_core::differ::has_change;
use aliform_core::provider::ResourceType;
use aliform_core::resource::{Resource, State};
use async_trait::async_trait;
use serde_json::json;

use super::{
    Attributes, EcdNetworkPackage, ResourceHandler, Timeouts, check_force_new, required_str,
};
use crate::client::{AliyunClient, ECD};
use crate::error::{AlicloudError, Result};
use crate::extract::{get_path, value_to_string};
use crate::request::RpcRequest;
use crate::retry::ApiCall;
use crate::services::ecd::EcdService;
use crate::utils::read_attributes;
use crate::waiter::{StateWaiter, WaitTarget};

const IN_USE: &str = "InUse";

const ATTRIBUTES: &[(&str, &str)] = &[
    ("office_site_id", "OfficeSiteId"),
    ("office_site_name", "OfficeSiteName"),
    ("bandwidth", "Bandwidth"),
    ("internet_charge_type", "InternetChargeType"),
    ("status", "NetworkPackageStatus"),
];

const FORCE_NEW: &[&str] = &["office_site_id"];

impl EcdNetworkPackage {
    async fn wait_in_use(
        &self,
        client: &AliyunClient,
        id: &str,
        timeout: std::time::Duration,
    ) -> Result<()> {
        let service = EcdService::new(client);
        StateWaiter::new(id, WaitTarget::reached(&[IN_USE]), timeout)
            .wait(|| service.network_package_status(id))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceHandler for EcdNetworkPackage {
    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(10, 10, 10)
    }

    async fn create(&self, client: &AliyunClient, resource: &Resource) -> Result<String> {
        let bandwidth = resource
            .get_int("bandwidth")
            .ok_or_else(|| AlicloudError::MissingAttribute("bandwidth".to_string()))?;

        let mut request = RpcRequest::with_region(&client.region_id);
        request
            .set("OfficeSiteId", required_str(resource, "office_site_id")?)
            .set("Bandwidth", bandwidth);

        let call =
            ApiCall::new(ECD, "CreateNetworkPackage", request).timeout(self.timeouts().create);
        let response = call
            .send(client)
            .await
            .map_err(|e| e.with_action(self.name(), call.action()))?;
        let id = get_path(&response, "$.NetworkPackageId")
            .map(value_to_string)
            .map_err(|e| e.with_action(self.name(), call.action()))?;
        log::info!("Created ECD network package {}", id);

        self.wait_in_use(client, &id, self.timeouts().create).await?;
        Ok(id)
    }

    async fn read(&self, client: &AliyunClient, id: &str) -> Result<Option<Attributes>> {
        match EcdService::new(client).describe_network_package(id).await {
            Ok(object) => Ok(Some(read_attributes(&object, ATTRIBUTES))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn update(
        &self,
        client: &AliyunClient,
        id: &str,
        from: &State,
        to: &Resource,
    ) -> Result<()> {
        check_force_new(from, to, FORCE_NEW)?;
        if !has_change(from, to, "bandwidth") {
            return Ok(());
        }
        let bandwidth = to
            .get_int("bandwidth")
            .ok_or_else(|| AlicloudError::MissingAttribute("bandwidth".to_string()))?;

        let mut request = RpcRequest::with_region(&client.region_id);
        request.set("NetworkPackageId", id).set("Bandwidth", bandwidth);
        let call = ApiCall::new(ECD, "ModifyNetworkPackageBandwidth", request)
            .timeout(self.timeouts().update);
        call.send(client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;

        self.wait_in_use(client, id, self.timeouts().update).await
    }

    async fn delete(&self, client: &AliyunClient, id: &str) -> Result<()> {
        let mut request = RpcRequest::with_region(&client.region_id);
        request.set("NetworkPackageId", json!([id]));
        let call =
            ApiCall::new(ECD, "DeleteNetworkPackages", request).timeout(self.timeouts().delete);
        match call.send(client).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.with_action(id, call.action())),
        }

        let service = EcdService::new(client);
        StateWaiter::new(id, WaitTarget::Deleted, self.timeouts().delete)
            .wait(|| service.network_package_status(id))
            .await?;
        Ok(())
    }
}
