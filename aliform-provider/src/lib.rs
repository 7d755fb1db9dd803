//! Aliform Alibaba Cloud Provider
//!
//! Alibaba Cloud resource provider built on the RPC-style product APIs.
//!
//! ## Module Structure
//!
//! - `client` - Endpoint resolution, request signing and the HTTP transport
//! - `config` - Provider configuration from the provider block and environment
//! - `request` - Flat `Key.N` request building from resource attributes
//! - `retry` - Retry-wrapped API calls with incremental back-off
//! - `extract` - Path extraction and not-found detection on responses
//! - `waiter` - Status polling until a target state is reached
//! - `tags` - Tag diffing and the tag/untag/list APIs
//! - `services` - Per-product describe and status refresh calls
//! - `resources` - Resource and data-source handlers
//! - `provider` - AlicloudProvider implementation

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod provider;
pub mod request;
pub mod resources;
pub mod retry;
pub mod services;
pub mod tags;
pub mod utils;
pub mod waiter;

#[cfg(test)]
mod testing;

// Re-export main types
pub use client::AliyunClient;
pub use config::ProviderConfig;
pub use error::{AlicloudError, Result};
pub use provider::AlicloudProvider;

use aliform_core::provider::{BoxFuture, Provider, ProviderResult};
use aliform_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AlicloudProvider {
    fn name(&self) -> &'static str {
        "alicloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn aliform_core::provider::ResourceType>> {
        resources::resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.evaluate_data_source(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
