//! Alibaba Cloud RPC client
//!
//! `AliyunClient` resolves the endpoint of a product, flattens the request and
//! hands it to an `RpcTransport`. The transport is a trait object so tests can
//! script responses without a network.

pub mod signer;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;

pub use transport::{HttpTransport, RpcInvocation, RpcTransport};

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::request::RpcRequest;
use transport::truncate_for_log;

/// An RPC API: product code, version and endpoint placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product {
    /// Product code, also the key of endpoint overrides (lowercased)
    pub code: &'static str,
    pub version: &'static str,
    /// Endpoint used regardless of the configured region
    pub fixed_endpoint: Option<&'static str>,
}

impl Product {
    pub const fn regional(code: &'static str, version: &'static str) -> Self {
        Self {
            code,
            version,
            fixed_endpoint: None,
        }
    }

    pub const fn fixed(code: &'static str, version: &'static str, endpoint: &'static str) -> Self {
        Self {
            code,
            version,
            fixed_endpoint: Some(endpoint),
        }
    }
}

pub const ECD: Product = Product::regional("ecd", "2020-09-30");
pub const EMR: Product = Product::regional("Emr", "2016-04-08");
pub const EMR_V2: Product = Product::regional("Emr", "2021-03-20");
pub const RAM: Product = Product::fixed("Ram", "2015-05-01", "ram.aliyuncs.com");
/// Service opening is only served from these regions
pub const ONS_OPEN: Product = Product::fixed("Ons", "2019-02-14", "ons.cn-hangzhou.aliyuncs.com");
pub const VS_OPEN: Product = Product::fixed("vs", "2018-12-12", "vs.cn-shanghai.aliyuncs.com");

/// Client shared by every service and resource handler
#[derive(Clone)]
pub struct AliyunClient {
    pub region_id: String,
    endpoints: HashMap<String, String>,
    transport: Arc<dyn RpcTransport>,
}

impl AliyunClient {
    /// Client backed by the signed HTTP transport
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(&config.region, Arc::new(transport))
            .with_endpoints(config.endpoints.clone()))
    }

    pub fn with_transport(region_id: &str, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            region_id: region_id.to_string(),
            endpoints: HashMap::new(),
            transport,
        }
    }

    /// Endpoint overrides keyed by product code (case-insensitive)
    pub fn with_endpoints(mut self, endpoints: HashMap<String, String>) -> Self {
        self.endpoints = endpoints
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self
    }

    /// Resolve the endpoint: explicit override, fixed endpoint, then the regional default
    pub fn endpoint(&self, product: &Product) -> String {
        let code = product.code.to_lowercase();
        if let Some(endpoint) = self.endpoints.get(&code) {
            return endpoint.clone();
        }
        if let Some(endpoint) = product.fixed_endpoint {
            return endpoint.to_string();
        }
        format!("{}.{}.aliyuncs.com", code, self.region_id)
    }

    /// Build the invocation for one action without sending it
    pub fn invocation(
        &self,
        product: &Product,
        action: &str,
        query: Option<&RpcRequest>,
        request: &RpcRequest,
        autoretry: bool,
    ) -> RpcInvocation {
        RpcInvocation {
            endpoint: self.endpoint(product),
            product: product.code.to_string(),
            version: product.version.to_string(),
            action: action.to_string(),
            region_id: if product.fixed_endpoint.is_some() {
                String::new()
            } else {
                self.region_id.clone()
            },
            query: query.map(RpcRequest::flatten).unwrap_or_default(),
            body: request.flatten(),
            autoretry,
        }
    }

    /// Send an invocation and log the exchange
    pub async fn invoke(&self, invocation: &RpcInvocation) -> Result<serde_json::Value> {
        log::debug!(
            "{} {} ({}) request: {:?}",
            invocation.product,
            invocation.action,
            invocation.endpoint,
            invocation.body
        );
        let result = self.transport.call(invocation).await;
        match &result {
            Ok(response) => log::debug!(
                "{} {} response: {}",
                invocation.product,
                invocation.action,
                truncate_for_log(&response.to_string())
            ),
            Err(e) => log::debug!("{} {} failed: {}", invocation.product, invocation.action, e),
        }
        result
    }

    /// POST one RPC action to the product's endpoint
    pub async fn rpc_post(
        &self,
        product: &Product,
        action: &str,
        query: Option<&RpcRequest>,
        request: &RpcRequest,
        autoretry: bool,
    ) -> Result<serde_json::Value> {
        let invocation = self.invocation(product, action, query, request, autoretry);
        self.invoke(&invocation).await
    }
}
