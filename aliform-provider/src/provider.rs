//! Alibaba Cloud Provider implementation
//!
//! Dispatches host lifecycle calls to the resource handlers by type name and
//! maps handler results into `State`.

use aliform_core::provider::{ProviderError, ProviderResult};
use aliform_core::resource::{Resource, ResourceId, State};

use crate::client::AliyunClient;
use crate::config::ProviderConfig;
use crate::error::AlicloudError;
use crate::resources::{self, DataSourceHandler, ResourceHandler};

/// Alibaba Cloud Provider
pub struct AlicloudProvider {
    client: AliyunClient,
}

impl AlicloudProvider {
    /// Create a provider talking to the signed HTTP transport
    pub fn new(config: &ProviderConfig) -> Result<Self, AlicloudError> {
        Ok(Self::with_client(AliyunClient::new(config)?))
    }

    pub fn with_client(client: AliyunClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AliyunClient {
        &self.client
    }

    fn handler(&self, id: &ResourceId) -> ProviderResult<&'static dyn ResourceHandler> {
        resources::handler(&id.resource_type).ok_or_else(|| {
            ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                .for_resource(id.clone())
        })
    }

    fn data_source(&self, id: &ResourceId) -> ProviderResult<&'static dyn DataSourceHandler> {
        resources::data_source(&id.resource_type).ok_or_else(|| {
            ProviderError::new(format!("Unknown data source type: {}", id.resource_type))
                .for_resource(id.clone())
        })
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its provider-assigned identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        match handler
            .read(&self.client, identifier)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?
        {
            Some(attributes) => {
                Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
            }
            None => {
                log::debug!("{} {} no longer exists", id, identifier);
                Ok(State::not_found(id.clone()))
            }
        }
    }

    /// Create a resource and read it back
    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let handler = self.handler(id)?;

        log::info!("Creating {}", id);
        let identifier = handler
            .create(&self.client, resource)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        log::info!("Created {} as {}", id, identifier);

        let state = self.read_resource(id, Some(&identifier)).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "{} was created but could not be read back",
                identifier
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }

    /// Update a resource in place and read it back
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let handler = self.handler(id)?;

        log::info!("Updating {} ({})", id, identifier);
        handler
            .update(&self.client, identifier, from, to)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        let state = self.read_resource(id, Some(identifier)).await?;
        if !state.exists {
            return Err(ProviderError::not_found(format!(
                "{} disappeared during update",
                identifier
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }

    /// Delete a resource
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let handler = self.handler(id)?;

        log::info!("Deleting {} ({})", id, identifier);
        handler
            .delete(&self.client, identifier)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        log::info!("Deleted {}", id);
        Ok(())
    }

    /// Evaluate a data source
    pub async fn evaluate_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let handler = self.data_source(id)?;

        let (identifier, attributes) = handler
            .read(&self.client, resource)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        log::info!("Read data source {} as {}", id, identifier);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }
}
