//! Elastic Cloud Desktop (ECD) service
//!
//! Describes for office sites, NAS file systems, images, directories and
//! commands serve ECD resource types that have no handler here yet.

use std::collections::HashMap;
use std::time::Duration;

use aliform_core::differ::TagDiff;
use aliform_core::resource::Value;
use serde_json::json;

use super::{Describe, IdCheck};
use crate::client::{AliyunClient, ECD};
use crate::error::Result;
use crate::request::{AttrMapping, RpcRequest};
use crate::retry::ApiCall;
use crate::tags::{self, TagApi, TagIdStyle};
use crate::waiter::{Refreshed, refresh_status};

/// Error returned while a policy group is still applying an earlier change
pub const POLICY_STATUS_MODIFICATION: &str = "InvalidPolicyStatus.Modification";

pub const ECD_TAG_API: TagApi = TagApi::new(ECD, "ALIYUN::GWS::INSTANCE", TagIdStyle::Indexed);

/// Fields of an access policy rule block
pub const ACCESS_RULE_FIELDS: &[AttrMapping] =
    &[("cidr_ip", "CidrIp"), ("description", "Description")];

/// Fields of a security policy rule block
pub const SECURITY_RULE_FIELDS: &[AttrMapping] = &[
    ("cidr_ip", "CidrIp"),
    ("description", "Description"),
    ("ip_protocol", "IpProtocol"),
    ("policy", "Policy"),
    ("port_range", "PortRange"),
    ("priority", "Priority"),
    ("type", "Type"),
];

const fn describe(action: &'static str, path: &'static str, check: IdCheck) -> Describe {
    Describe {
        product: ECD,
        action,
        path,
        check,
        resource: "ECD",
    }
}

const POLICY_GROUPS: Describe = describe(
    "DescribePolicyGroups",
    "$.DescribePolicyGroups",
    IdCheck::First("PolicyGroupId"),
);
const OFFICE_SITES: Describe =
    describe("DescribeOfficeSites", "$.OfficeSites", IdCheck::First("OfficeSiteId"));
const NAS_FILE_SYSTEMS: Describe =
    describe("DescribeNASFileSystems", "$.FileSystems", IdCheck::First("FileSystemId"));
const NETWORK_PACKAGES: Describe = describe(
    "DescribeNetworkPackages",
    "$.NetworkPackages",
    IdCheck::First("NetworkPackageId"),
);
const DESKTOPS: Describe = describe("DescribeDesktops", "$.Desktops", IdCheck::First("DesktopId"));
const IMAGES: Describe = describe("DescribeImages", "$.Images", IdCheck::First("ImageId"));
const INVOCATIONS: Describe =
    describe("DescribeInvocations", "$.Invocations", IdCheck::First("InvokeId"));
const SNAPSHOTS: Describe = Describe {
    resource: "Snapshot",
    ..describe("DescribeSnapshots", "$.Snapshots", IdCheck::Unchecked)
};
const BUNDLES: Describe = Describe {
    resource: "ECD:Bundle",
    ..describe("DescribeBundles", "$.Bundles", IdCheck::Scan("BundleId"))
};
const DIRECTORIES: Describe =
    describe("DescribeDirectories", "$.Directories", IdCheck::First("DirectoryId"));

pub struct EcdService<'a> {
    client: &'a AliyunClient,
}

impl<'a> EcdService<'a> {
    pub fn new(client: &'a AliyunClient) -> Self {
        Self { client }
    }

    fn request(&self) -> RpcRequest {
        RpcRequest::with_region(&self.client.region_id)
    }

    /// Request filtering a list API by a single ID (`Key.1`)
    fn filter(&self, key: &str, id: &str) -> RpcRequest {
        let mut request = self.request();
        request.set(key, json!([id]));
        request
    }

    // ===== Describe =====

    pub async fn describe_policy_group(&self, id: &str) -> Result<serde_json::Value> {
        POLICY_GROUPS
            .call(self.client, self.filter("PolicyGroupId", id), id)
            .await
    }

    pub async fn describe_office_site(&self, id: &str) -> Result<serde_json::Value> {
        OFFICE_SITES
            .call(self.client, self.filter("OfficeSiteId", id), id)
            .await
    }

    /// Office sites of the AD connector kind share the office site API
    pub async fn describe_ad_connector_office_site(&self, id: &str) -> Result<serde_json::Value> {
        self.describe_office_site(id).await
    }

    pub async fn describe_nas_file_system(&self, id: &str) -> Result<serde_json::Value> {
        NAS_FILE_SYSTEMS
            .call(self.client, self.filter("FileSystemId", id), id)
            .await
    }

    pub async fn describe_network_package(&self, id: &str) -> Result<serde_json::Value> {
        NETWORK_PACKAGES
            .call(self.client, self.filter("NetworkPackageId", id), id)
            .await
    }

    pub async fn describe_desktop(&self, id: &str) -> Result<serde_json::Value> {
        DESKTOPS
            .call(self.client, self.filter("DesktopId", id), id)
            .await
    }

    pub async fn describe_image(&self, id: &str) -> Result<serde_json::Value> {
        IMAGES.call(self.client, self.filter("ImageId", id), id).await
    }

    pub async fn describe_command(&self, id: &str) -> Result<serde_json::Value> {
        let mut request = self.request();
        request.set("InvokeId", id);
        INVOCATIONS.call(self.client, request, id).await
    }

    /// The snapshot API filters by ID itself; the first element is taken as-is
    pub async fn describe_snapshot(&self, id: &str) -> Result<serde_json::Value> {
        let mut request = self.request();
        request.set("SnapshotId", id);
        SNAPSHOTS.call(self.client, request, id).await
    }

    /// The bundle API may return system bundles first, so the whole list is searched
    pub async fn describe_bundle(&self, id: &str) -> Result<serde_json::Value> {
        BUNDLES
            .call(self.client, self.filter("BundleId", id), id)
            .await
    }

    pub async fn describe_ram_directory(&self, id: &str) -> Result<serde_json::Value> {
        DIRECTORIES
            .call(self.client, self.filter("DirectoryId", id), id)
            .await
    }

    pub async fn describe_ad_connector_directory(&self, id: &str) -> Result<serde_json::Value> {
        DIRECTORIES
            .call(self.client, self.filter("DirectoryId", id), id)
            .await
    }

    // ===== Status refresh =====

    pub async fn office_site_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_office_site(id).await, "Status")
    }

    pub async fn ad_connector_office_site_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_ad_connector_office_site(id).await, "Status")
    }

    pub async fn nas_file_system_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_nas_file_system(id).await, "FileSystemStatus")
    }

    pub async fn network_package_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_network_package(id).await, "NetworkPackageStatus")
    }

    pub async fn desktop_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_desktop(id).await, "DesktopStatus")
    }

    pub async fn desktop_type(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_desktop(id).await, "DesktopType")
    }

    /// Refresh reporting the charge type as a payment type
    pub async fn desktop_payment_type(&self, id: &str) -> Result<Refreshed> {
        let refreshed = refresh_status(self.describe_desktop(id).await, "ChargeType")?;
        Ok(refreshed.map(|(object, charge_type)| (object, payment_type(&charge_type).to_string())))
    }

    pub async fn image_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_image(id).await, "Status")
    }

    pub async fn command_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_command(id).await, "InvocationStatus")
    }

    // ===== Policy rules =====

    async fn revoke_rules(
        &self,
        id: &str,
        prefix: &str,
        removed: &[Value],
        fields: &[AttrMapping],
        timeout: Duration,
    ) -> Result<()> {
        if removed.is_empty() {
            return Ok(());
        }
        let mut request = self.request();
        request.set("PolicyGroupId", id);
        request.set_indexed_objects(prefix, removed, fields);

        let call = ApiCall::new(ECD, "ModifyPolicyGroup", request)
            .timeout(timeout)
            .retry_on(&[POLICY_STATUS_MODIFICATION]);
        call.send(self.client)
            .await
            .map_err(|e| e.with_action(id, call.action()))?;
        Ok(())
    }

    /// Revoke access rules that left the configuration, in a call of their own
    pub async fn revoke_access_policy_rules(
        &self,
        id: &str,
        removed: &[Value],
        timeout: Duration,
    ) -> Result<()> {
        self.revoke_rules(id, "RevokeAccessPolicyRule", removed, ACCESS_RULE_FIELDS, timeout)
            .await
    }

    /// Revoke security rules that left the configuration, in a call of their own
    pub async fn revoke_security_policy_rules(
        &self,
        id: &str,
        removed: &[Value],
        timeout: Duration,
    ) -> Result<()> {
        self.revoke_rules(id, "RevokeSecurityPolicyRule", removed, SECURITY_RULE_FIELDS, timeout)
            .await
    }

    // ===== Tags =====

    pub async fn set_resource_tags(&self, id: &str, diff: &TagDiff) -> Result<()> {
        tags::set_resource_tags(self.client, &ECD_TAG_API, id, diff).await
    }

    pub async fn list_tags(&self, id: &str) -> Result<HashMap<String, String>> {
        let entries =
            tags::list_tag_resources(self.client, &ECD_TAG_API, id, "$.TagResources").await?;
        Ok(tags::tags_to_map(&entries))
    }
}

/// Map a desktop charge type onto the payment type used in configuration
pub fn payment_type(charge_type: &str) -> &str {
    match charge_type {
        "PostPaid" => "PayAsYouGo",
        "PrePaid" => "Subscription",
        other => other,
    }
}

/// Add newly authorized access rules to a create/modify request
pub fn authorize_access_policy_rules(request: &mut RpcRequest, added: &[Value]) {
    request.set_indexed_objects("AuthorizeAccessPolicyRule", added, ACCESS_RULE_FIELDS);
}

/// Add newly authorized security rules to a create/modify request
pub fn authorize_security_policy_rules(request: &mut RpcRequest, added: &[Value]) {
    request.set_indexed_objects("AuthorizeSecurityPolicyRule", added, SECURITY_RULE_FIELDS);
}
