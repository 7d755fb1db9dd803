//! ons_service / vs_service: open an account-level service

use std::collections::HashMap;

use aliform_core::resource::{Resource, Value};
use async_trait::async_trait;

use super::{Attributes, DataSourceHandler, OnsService, VsService};
use crate::client::AliyunClient;
use crate::error::Result;
use crate::services::open_service::{ONS, OpenService, VS};

async fn open(
    service: &OpenService,
    client: &AliyunClient,
    resource: &Resource,
) -> Result<(String, Attributes)> {
    let enable = resource.get_str("enable") == Some("On");
    let (id, status) = service.open(client, enable).await?;

    let mut attributes = HashMap::new();
    attributes.insert(
        "enable".to_string(),
        Value::from(if enable { "On" } else { "Off" }),
    );
    attributes.insert("status".to_string(), Value::String(status));
    Ok((id, attributes))
}

#[async_trait]
impl DataSourceHandler for OnsService {
    async fn read(
        &self,
        client: &AliyunClient,
        resource: &Resource,
    ) -> Result<(String, Attributes)> {
        open(&ONS, client, resource).await
    }
}

#[async_trait]
impl DataSourceHandler for VsService {
    async fn read(
        &self,
        client: &AliyunClient,
        resource: &Resource,
    ) -> Result<(String, Attributes)> {
        open(&VS, client, resource).await
    }
}
