//! Per-product services
//!
//! Each service wraps the describe/refresh calls of one product. A describe
//! is one `ApiCall` followed by the response extractor.

pub mod ecd;
pub mod emr;
pub mod open_service;
pub mod ram;

use serde_json::Value;

use crate::client::{AliyunClient, Product};
use crate::error::{AlicloudError, Result};
use crate::extract::{find_with_id, first_with_id, items_at};
use crate::request::RpcRequest;
use crate::retry::ApiCall;

/// How the object returned by a describe call is matched to the requested ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdCheck {
    /// The first element must carry the ID in this field
    First(&'static str),
    /// Any element carrying the ID in this field
    Scan(&'static str),
    /// The first element, without checking
    Unchecked,
}

/// A list-style describe action
#[derive(Debug, Clone, Copy)]
pub struct Describe {
    pub product: Product,
    pub action: &'static str,
    pub path: &'static str,
    pub check: IdCheck,
    /// Label used in not-found errors
    pub resource: &'static str,
}

impl Describe {
    pub async fn call(
        &self,
        client: &AliyunClient,
        request: RpcRequest,
        id: &str,
    ) -> Result<Value> {
        let response = ApiCall::new(self.product, self.action, request)
            .autoretry(true)
            .send(client)
            .await
            .map_err(|e| e.with_action(id, self.action))?;

        let object = match self.check {
            IdCheck::First(field) => first_with_id(&response, self.path, field, id, self.resource),
            IdCheck::Scan(field) => find_with_id(&response, self.path, field, id, self.resource),
            IdCheck::Unchecked => items_at(&response, self.path).and_then(|items| {
                items
                    .into_iter()
                    .next()
                    .ok_or_else(|| AlicloudError::not_found(self.resource, id))
            }),
        };
        object.map_err(|e| e.with_action(id, self.action))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::ECD;
    use crate::testing::mock_client;

    const SNAPSHOTS: Describe = Describe {
        product: ECD,
        action: "DescribeSnapshots",
        path: "$.Snapshots",
        check: IdCheck::Unchecked,
        resource: "Snapshot",
    };

    #[tokio::test]
    async fn unchecked_describe_takes_first_element() {
        let (client, transport) = mock_client();
        transport.respond("DescribeSnapshots", json!({"Snapshots": [{"SnapshotId": "s-other"}]}));

        let object = SNAPSHOTS.call(&client, RpcRequest::new(), "s-1").await.unwrap();

        assert_eq!(object["SnapshotId"], "s-other");
        assert!(transport.calls()[0].autoretry);
    }

    #[tokio::test]
    async fn not_found_keeps_action_context() {
        let (client, transport) = mock_client();
        transport.respond("DescribeSnapshots", json!({"Snapshots": []}));

        let err = SNAPSHOTS.call(&client, RpcRequest::new(), "s-1").await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("DescribeSnapshots"));
    }

    #[tokio::test]
    async fn response_without_list_is_not_reported_absent() {
        let (client, transport) = mock_client();
        transport.respond("DescribeSnapshots", json!({"RequestId": "r-1"}));

        let err = SNAPSHOTS.call(&client, RpcRequest::new(), "s-1").await.unwrap_err();

        assert!(!err.is_not_found());
        assert!(matches!(err.root(), AlicloudError::AttributeMissing { .. }));
        assert!(err.to_string().contains("DescribeSnapshots"));
    }
}
