//! Resource and data-source handlers
//!
//! Each resource type is a unit struct declared with `define_resource_type!`
//! and implements `ResourceHandler` (or `DataSourceHandler`) in its own
//! module. `AlicloudProvider` looks handlers up by type name.

pub mod ecd_desktop;
pub mod ecd_network_package;
pub mod ecd_policy_group;
pub mod open_service;
pub mod ram_group_policy_attachment;

use std::collections::HashMap;
use std::time::Duration;

use aliform_core::provider::ResourceType;
use aliform_core::resource::{Resource, State, Value};
use async_trait::async_trait;

use crate::client::AliyunClient;
use crate::error::{AlicloudError, Result};

/// Attributes mapped back from a remote object
pub type Attributes = HashMap<String, Value>;

/// Per-operation deadlines of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::minutes(5, 5, 5)
    }
}

/// CRUD operations of one managed resource type
#[async_trait]
pub trait ResourceHandler: ResourceType {
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Create the remote object and return its identifier
    async fn create(&self, client: &AliyunClient, resource: &Resource) -> Result<String>;

    /// Read the remote object; `None` when it no longer exists
    async fn read(&self, client: &AliyunClient, id: &str) -> Result<Option<Attributes>>;

    async fn update(
        &self,
        client: &AliyunClient,
        id: &str,
        from: &State,
        to: &Resource,
    ) -> Result<()>;

    /// Delete the remote object; an object that is already gone is not an error
    async fn delete(&self, client: &AliyunClient, id: &str) -> Result<()>;
}

/// A read-only data source
#[async_trait]
pub trait DataSourceHandler: ResourceType {
    /// Evaluate the data source, returning its ID and attributes
    async fn read(
        &self,
        client: &AliyunClient,
        resource: &Resource,
    ) -> Result<(String, Attributes)>;
}

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
        }
    };
    ($name:ident, $type_name:expr, data_source) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn is_data_source(&self) -> bool {
                true
            }
        }
    };
}

define_resource_type!(RamGroupPolicyAttachment, "ram_group_policy_attachment");
define_resource_type!(EcdNetworkPackage, "ecd_network_package");
define_resource_type!(EcdPolicyGroup, "ecd_policy_group");
define_resource_type!(EcdDesktop, "ecd_desktop");
define_resource_type!(OnsService, "ons_service", data_source);
define_resource_type!(VsService, "vs_service", data_source);

static HANDLERS: &[&dyn ResourceHandler] = &[
    &RamGroupPolicyAttachment,
    &EcdNetworkPackage,
    &EcdPolicyGroup,
    &EcdDesktop,
];

static DATA_SOURCES: &[&dyn DataSourceHandler] = &[&OnsService, &VsService];

/// Returns all resource and data-source types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(RamGroupPolicyAttachment),
        Box::new(EcdNetworkPackage),
        Box::new(EcdPolicyGroup),
        Box::new(EcdDesktop),
        Box::new(OnsService),
        Box::new(VsService),
    ]
}

pub fn handler(resource_type: &str) -> Option<&'static dyn ResourceHandler> {
    HANDLERS
        .iter()
        .copied()
        .find(|handler| handler.name() == resource_type)
}

pub fn data_source(data_source_type: &str) -> Option<&'static dyn DataSourceHandler> {
    DATA_SOURCES
        .iter()
        .copied()
        .find(|handler| handler.name() == data_source_type)
}

/// A string attribute the remote API cannot do without
pub(crate) fn required_str<'a>(resource: &'a Resource, key: &str) -> Result<&'a str> {
    resource
        .get_str(key)
        .ok_or_else(|| AlicloudError::MissingAttribute(key.to_string()))
}

/// Reject changes to attributes that can only be set at creation
pub(crate) fn check_force_new(from: &State, to: &Resource, force_new: &[&str]) -> Result<()> {
    let changed: Vec<&str> = force_new
        .iter()
        .copied()
        .filter(|key| aliform_core::differ::has_change(from, to, key))
        .collect();
    if changed.is_empty() {
        return Ok(());
    }
    Err(AlicloudError::Unsupported(format!(
        "{} cannot be changed in place, the resource must be replaced",
        changed.join(", ")
    )))
}
