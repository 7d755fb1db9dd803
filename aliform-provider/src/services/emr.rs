//! E-MapReduce (EMR) service
//!
//! Two API generations live side by side: the 2016 API addresses clusters by
//! `Id` and tags them with indexed parameters, the 2021 API uses `ClusterId`,
//! runs long changes as operations, and tags with list parameters.
//!
//! No EMR resource handler is registered yet. These calls are the service
//! layer those handlers build on.

use std::collections::HashMap;
use std::time::Duration;

use aliform_core::differ::{TagDiff, diff_tags};
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::client::{AliyunClient, EMR, EMR_V2, Product};
use crate::error::{AlicloudError, Result};
use crate::extract::{items_at, object_at, value_to_string};
use crate::request::RpcRequest;
use crate::retry::ApiCall;
use crate::tags::{self, TagApi, TagIdStyle};
use crate::waiter::{Refreshed, StateWaiter, WaitTarget, refresh_status, wait_all};

pub const EMR_TAG_API: TagApi = TagApi::new(EMR, "cluster", TagIdStyle::Indexed);
pub const EMR_V2_TAG_API: TagApi = TagApi::new(EMR_V2, "cluster", TagIdStyle::List);

const CLUSTER_WAIT_INTERVAL: Duration = Duration::from_secs(5);
const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(10);
const OPERATION_CALL_TIMEOUT: Duration = Duration::from_secs(3 * 60);
const NODE_GROUP_PAGE_SIZE: i64 = 100;

pub struct EmrService<'a> {
    client: &'a AliyunClient,
}

impl<'a> EmrService<'a> {
    pub fn new(client: &'a AliyunClient) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        product: Product,
        action: &str,
        request: RpcRequest,
        id: &str,
    ) -> Result<Value> {
        self.send_with(ApiCall::new(product, action, request), id).await
    }

    async fn send_with(&self, call: ApiCall, id: &str) -> Result<Value> {
        let call = call.autoretry(true);
        call.send(self.client)
            .await
            .map_err(|e| e.with_action(id, call.action()))
    }

    fn request(&self) -> RpcRequest {
        RpcRequest::with_region(&self.client.region_id)
    }

    // ===== 2016-04-08 API =====

    /// Describe a v1 cluster; a released cluster is reported as not found
    pub async fn describe_cluster(&self, id: &str) -> Result<Value> {
        let mut request = self.request();
        request.set("Id", id);
        let response = self.send(EMR, "DescribeClusterV2", request, id).await?;

        let object = object_at(&response, "$.ClusterInfo", "EmrCluster", id)?;
        if object.get("Status").and_then(Value::as_str) == Some("RELEASED") {
            return Err(AlicloudError::not_found("EmrCluster", id));
        }
        Ok(object)
    }

    pub async fn describe_cluster_basic_info(&self, id: &str) -> Result<Value> {
        let mut request = self.request();
        request.set("ClusterId", id);
        let response = self.send(EMR, "DescribeClusterBasicInfo", request, id).await?;
        object_at(&response, "$.ClusterInfo", "EmrCluster", id)
    }

    /// Cluster types offered by one EMR main version
    pub async fn describe_main_version_cluster_types(&self, version: &str) -> Result<Vec<Value>> {
        let mut request = self.request();
        request.set("EmrVersion", version);
        let response = self.send(EMR, "DescribeEmrMainVersion", request, version).await?;

        let path = "$.EmrMainVersion.ClusterTypeInfoList.ClusterTypeInfo";
        items_at(&response, path).map_err(|e| e.with_action(version, "DescribeEmrMainVersion"))
    }

    pub async fn cluster_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.describe_cluster(id).await, "Status")
    }

    /// Wait until a v1 cluster shows up (`Exists`) or disappears (`Deleted`)
    pub async fn wait_for_cluster(
        &self,
        id: &str,
        target: WaitTarget,
        timeout: Duration,
    ) -> Result<()> {
        StateWaiter::new(id, target, timeout)
            .interval(CLUSTER_WAIT_INTERVAL)
            .wait(|| self.cluster_status(id))
            .await?;
        Ok(())
    }

    pub async fn set_cluster_tags(&self, id: &str, diff: &TagDiff) -> Result<()> {
        tags::set_resource_tags(self.client, &EMR_TAG_API, id, diff).await
    }

    pub async fn list_cluster_tags(&self, id: &str) -> Result<HashMap<String, String>> {
        let path = "$.TagResources.TagResource";
        let entries = tags::list_tag_resources(self.client, &EMR_TAG_API, id, path).await?;
        Ok(tags::tags_to_map(&entries))
    }

    // ===== 2021-03-20 API =====

    /// Get a v2 cluster; a terminated cluster is reported as not found
    pub async fn get_v2_cluster(&self, id: &str) -> Result<Value> {
        let mut request = self.request();
        request.set("ClusterId", id);
        let response = self.send(EMR_V2, "GetCluster", request, id).await?;

        let object = object_at(&response, "$.Cluster", "EmrCluster", id)?;
        if object.get("ClusterState").and_then(Value::as_str) == Some("TERMINATED") {
            return Err(AlicloudError::not_found("EmrCluster", id));
        }
        Ok(object)
    }

    pub async fn get_v2_operation(&self, cluster_id: &str, operation_id: &str) -> Result<Value> {
        let mut request = self.request();
        request
            .set("ClusterId", cluster_id)
            .set("OperationId", operation_id);
        let call = ApiCall::new(EMR_V2, "GetOperation", request).timeout(OPERATION_CALL_TIMEOUT);
        let response = self.send_with(call, cluster_id).await?;
        object_at(&response, "$.Operation", "EmrOperation", operation_id)
    }

    /// Running node groups of a v2 cluster, optionally restricted to some IDs
    pub async fn list_v2_node_groups(
        &self,
        cluster_id: &str,
        node_group_ids: &[String],
    ) -> Result<Vec<Value>> {
        let mut request = self.request();
        request
            .set("ClusterId", cluster_id)
            .set("NodeGroupStates", json!(["RUNNING"]))
            .set("MaxResults", NODE_GROUP_PAGE_SIZE);
        if !node_group_ids.is_empty() {
            request.set("NodeGroupIds", json!(node_group_ids));
        }
        let response = self.send(EMR_V2, "ListNodeGroups", request, cluster_id).await?;
        items_at(&response, "$.NodeGroups")
            .map_err(|e| e.with_action(cluster_id, "ListNodeGroups"))
    }

    pub async fn v2_cluster_status(&self, id: &str) -> Result<Refreshed> {
        refresh_status(self.get_v2_cluster(id).await, "ClusterState")
    }

    pub async fn wait_for_v2_cluster(
        &self,
        id: &str,
        target: WaitTarget,
        timeout: Duration,
    ) -> Result<()> {
        StateWaiter::new(id, target, timeout)
            .interval(CLUSTER_WAIT_INTERVAL)
            .wait(|| self.v2_cluster_status(id))
            .await?;
        Ok(())
    }

    /// Poll one operation until it settles; `false` on failure or deadline
    ///
    /// Errors while polling are treated like a pending operation.
    async fn poll_operation(
        &self,
        cluster_id: &str,
        operation_id: &str,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let operation = self.get_v2_operation(cluster_id, operation_id);
            let polled = tokio::time::timeout(remaining, operation).await;
            if let Ok(Ok(operation)) = polled {
                let state = operation
                    .get("OperationState")
                    .map(value_to_string)
                    .unwrap_or_default();
                match state.as_str() {
                    "COMPLETED" | "PARTIAL_COMPLETED" => return true,
                    "FAILED" | "TERMINATED" => {
                        log::warn!(
                            "EMR operation {} on {} ended as {}",
                            operation_id,
                            cluster_id,
                            state
                        );
                        return false;
                    }
                    _ => log::debug!("EMR operation {} is {}", operation_id, state),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "EMR operation {} on {} did not finish in {:?}",
                    operation_id,
                    cluster_id,
                    timeout
                );
                return false;
            }
            tokio::time::sleep(OPERATION_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Wait for one operation per node group concurrently
    ///
    /// `operations` pairs a node group ID with the operation started on it.
    /// The result maps each node group to whether its operation succeeded.
    pub async fn wait_for_operations(
        &self,
        cluster_id: &str,
        operations: &[(String, String)],
        timeout: Duration,
    ) -> HashMap<String, bool> {
        let pollers = operations.iter().map(|(node_group_id, operation_id)| {
            (
                node_group_id.clone(),
                self.poll_operation(cluster_id, operation_id, timeout),
            )
        });
        wait_all(pollers).await
    }

    pub async fn list_v2_cluster_tags(&self, id: &str) -> Result<HashMap<String, String>> {
        let entries =
            tags::list_tag_resources(self.client, &EMR_V2_TAG_API, id, "$.TagResources").await?;
        Ok(tags::tags_to_map(&entries))
    }

    /// Make the tags of a v2 cluster equal `desired`, diffing against the live tags
    pub async fn replace_v2_cluster_tags(
        &self,
        id: &str,
        desired: &HashMap<String, String>,
    ) -> Result<()> {
        let current = self.list_v2_cluster_tags(id).await?;
        let diff = diff_tags(&current, desired);
        if diff.is_empty() {
            return Ok(());
        }
        tags::set_resource_tags(self.client, &EMR_V2_TAG_API, id, &diff).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::mock_client;

    #[tokio::test]
    async fn released_cluster_is_not_found() {
        let (client, transport) = mock_client();
        transport.respond(
            "DescribeClusterV2",
            json!({"ClusterInfo": {"Id": "c-1", "Status": "RELEASED"}}),
        );

        let err = EmrService::new(&client).describe_cluster("c-1").await.unwrap_err();

        assert!(err.is_not_found());
        let call = &transport.calls()[0];
        assert_eq!(call.body["Id"], "c-1");
        assert_eq!(call.version, "2016-04-08");
        assert!(call.autoretry);
    }

    #[tokio::test]
    async fn terminated_v2_cluster_is_not_found() {
        let (client, transport) = mock_client();
        transport.respond(
            "GetCluster",
            json!({"Cluster": {"ClusterId": "c-1", "ClusterState": "TERMINATED"}}),
        );

        let refreshed = EmrService::new(&client).v2_cluster_status("c-1").await.unwrap();

        assert!(refreshed.is_none());
        assert_eq!(transport.calls()[0].version, "2021-03-20");
    }

    #[tokio::test]
    async fn running_v2_cluster_reports_its_state() {
        let (client, transport) = mock_client();
        transport.respond(
            "GetCluster",
            json!({"Cluster": {"ClusterId": "c-1", "ClusterState": "RUNNING"}}),
        );

        let (_, state) = EmrService::new(&client).v2_cluster_status("c-1").await.unwrap().unwrap();

        assert_eq!(state, "RUNNING");
    }

    #[tokio::test]
    async fn main_version_lists_cluster_types() {
        let (client, transport) = mock_client();
        transport.respond(
            "DescribeEmrMainVersion",
            json!({"EmrMainVersion": {"ClusterTypeInfoList": {"ClusterTypeInfo": [
                {"ClusterType": "HADOOP"},
                {"ClusterType": "KAFKA"}
            ]}}}),
        );

        let types = EmrService::new(&client)
            .describe_main_version_cluster_types("EMR-3.22.0")
            .await
            .unwrap();

        assert_eq!(types.len(), 2);
        assert_eq!(transport.calls()[0].body["EmrVersion"], "EMR-3.22.0");
    }

    #[tokio::test]
    async fn main_version_without_type_list_is_an_error() {
        let (client, transport) = mock_client();
        transport.respond("DescribeEmrMainVersion", json!({"EmrMainVersion": {}}));

        let err = EmrService::new(&client)
            .describe_main_version_cluster_types("EMR-3.22.0")
            .await
            .unwrap_err();

        assert!(matches!(err.root(), AlicloudError::AttributeMissing { .. }));
    }

    #[tokio::test]
    async fn node_groups_are_filtered_to_running() {
        let (client, transport) = mock_client();
        transport.respond("ListNodeGroups", json!({"NodeGroups": [{"NodeGroupId": "ng-1"}]}));

        let groups = EmrService::new(&client)
            .list_v2_node_groups("c-1", &["ng-1".to_string()])
            .await
            .unwrap();

        assert_eq!(groups.len(), 1);
        let body = &transport.calls()[0].body;
        assert_eq!(body["NodeGroupStates.1"], "RUNNING");
        assert_eq!(body["NodeGroupIds.1"], "ng-1");
        assert_eq!(body["MaxResults"], "100");
    }

    #[tokio::test(start_paused = true)]
    async fn cluster_wait_polls_until_it_appears() {
        let (client, transport) = mock_client();
        transport.respond("DescribeClusterV2", json!({"ClusterInfo": null}));
        transport.respond(
            "DescribeClusterV2",
            json!({"ClusterInfo": {"Id": "c-1", "Status": "CREATING"}}),
        );

        EmrService::new(&client)
            .wait_for_cluster("c-1", WaitTarget::Exists, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(transport.calls_for("DescribeClusterV2").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_fan_out_per_node_group() {
        let (client, transport) = mock_client();
        // GetOperation answers in call order: first poll of each, then the rest
        transport.respond("GetOperation", json!({"Operation": {"OperationState": "COMPLETED"}}));
        transport.respond("GetOperation", json!({"Operation": {"OperationState": "FAILED"}}));

        let outcomes = EmrService::new(&client)
            .wait_for_operations(
                "c-1",
                &[
                    ("ng-1".to_string(), "op-1".to_string()),
                    ("ng-2".to_string(), "op-2".to_string()),
                ],
                Duration::from_secs(60),
            )
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes["ng-1"]);
        assert!(!outcomes["ng-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_operation_times_out_as_false() {
        let (client, transport) = mock_client();
        transport.respond("GetOperation", json!({"Operation": {"OperationState": "RUNNING"}}));
        let start = Instant::now();

        let outcomes = EmrService::new(&client)
            .wait_for_operations(
                "c-1",
                &[("ng-1".to_string(), "op-1".to_string())],
                Duration::from_secs(30),
            )
            .await;

        assert!(!outcomes["ng-1"]);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(41));
        assert_eq!(transport.calls()[0].body["OperationId"], "op-1");
    }

    #[tokio::test(start_paused = true)]
    async fn v2_tag_replacement_diffs_against_live_tags() {
        let (client, transport) = mock_client();
        transport.respond(
            "ListTagResources",
            json!({"TagResources": [
                {"TagKey": "env", "TagValue": "dev"},
                {"TagKey": "owner", "TagValue": "a"}
            ]}),
        );
        transport.respond("UntagResources", json!({}));
        transport.respond("TagResources", json!({}));

        let desired = HashMap::from([
            ("env".to_string(), "prod".to_string()),
            ("team".to_string(), "data".to_string()),
        ]);
        EmrService::new(&client)
            .replace_v2_cluster_tags("c-1", &desired)
            .await
            .unwrap();

        assert_eq!(
            transport.actions(),
            vec!["ListTagResources", "UntagResources", "TagResources"]
        );
        let untag = &transport.calls_for("UntagResources")[0];
        assert_eq!(untag.body["TagKeys.1"], "owner");
        assert_eq!(untag.body["ResourceIds.1"], "c-1");
        let tag = &transport.calls_for("TagResources")[0];
        assert_eq!(tag.body["Tags.1.Key"], "env");
        assert_eq!(tag.body["Tags.1.Value"], "prod");
        assert_eq!(tag.body["Tags.2.Key"], "team");
    }

    #[tokio::test(start_paused = true)]
    async fn v2_tag_replacement_skips_calls_when_unchanged() {
        let (client, transport) = mock_client();
        transport.respond(
            "ListTagResources",
            json!({"TagResources": [{"TagKey": "env", "TagValue": "dev"}]}),
        );

        let desired = HashMap::from([("env".to_string(), "dev".to_string())]);
        EmrService::new(&client)
            .replace_v2_cluster_tags("c-1", &desired)
            .await
            .unwrap();

        assert_eq!(transport.actions(), vec!["ListTagResources"]);
    }

    #[tokio::test]
    async fn v1_tags_are_read_from_nested_list() {
        let (client, transport) = mock_client();
        transport.respond(
            "ListTagResources",
            json!({"TagResources": {"TagResource": [{"TagKey": "env", "TagValue": "dev"}]}}),
        );

        let tags = EmrService::new(&client).list_cluster_tags("c-1").await.unwrap();

        assert_eq!(tags["env"], "dev");
        let call = &transport.calls()[0];
        assert_eq!(call.body["ResourceId.1"], "c-1");
        assert_eq!(call.body["ResourceType"], "cluster");
    }
}
