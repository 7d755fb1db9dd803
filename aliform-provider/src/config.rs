//! Provider configuration
//!
//! Region and credentials come from the provider block first and fall back to
//! the environment (`ALICLOUD_*`, then `ALIBABA_CLOUD_*`).

use std::collections::HashMap;
use std::time::Duration;

use aliform_core::resource::Value;
use serde::Deserialize;

use crate::error::{AlicloudError, Result};

const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Environment variables consulted for each setting, in order
const REGION_VARS: &[&str] = &["ALICLOUD_REGION", "ALIBABA_CLOUD_REGION"];
const ACCESS_KEY_VARS: &[&str] = &["ALICLOUD_ACCESS_KEY", "ALIBABA_CLOUD_ACCESS_KEY_ID"];
const SECRET_KEY_VARS: &[&str] = &["ALICLOUD_SECRET_KEY", "ALIBABA_CLOUD_ACCESS_KEY_SECRET"];
const SECURITY_TOKEN_VARS: &[&str] = &["ALICLOUD_SECURITY_TOKEN", "ALIBABA_CLOUD_SECURITY_TOKEN"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub security_token: Option<String>,
    /// "HTTPS" (default) or "HTTP"
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Per-product endpoint overrides, keyed by lowercase product code
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    /// Read timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub client_connect_timeout: u64,
}

fn default_protocol() -> String {
    "HTTPS".to_string()
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl ProviderConfig {
    pub fn new(
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            security_token: None,
            protocol: default_protocol(),
            endpoints: HashMap::new(),
            read_timeout: DEFAULT_READ_TIMEOUT_SECS,
            client_connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    pub fn with_endpoint(mut self, product: &str, endpoint: impl Into<String>) -> Self {
        self.endpoints
            .insert(product.to_lowercase(), endpoint.into());
        self
    }

    /// Build configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::from_attributes(&HashMap::new())
    }

    /// Build configuration from a provider block, falling back to the environment
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self> {
        Self::resolve(attributes, |name| std::env::var(name).ok())
    }

    fn resolve(
        attributes: &HashMap<String, Value>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let setting = |key: &str, vars: &[&str]| -> Option<String> {
            attributes
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    vars.iter()
                        .find_map(|var| lookup(var).filter(|s| !s.is_empty()))
                })
        };

        let region = setting("region", REGION_VARS).ok_or_else(|| {
            AlicloudError::Config(
                "region is required; set it in the provider block or ALICLOUD_REGION".to_string(),
            )
        })?;
        let access_key = setting("access_key", ACCESS_KEY_VARS).ok_or_else(|| {
            AlicloudError::Config(
                "access_key is required; set it in the provider block or ALICLOUD_ACCESS_KEY"
                    .to_string(),
            )
        })?;
        let secret_key = setting("secret_key", SECRET_KEY_VARS).ok_or_else(|| {
            AlicloudError::Config(
                "secret_key is required; set it in the provider block or ALICLOUD_SECRET_KEY"
                    .to_string(),
            )
        })?;

        let mut config = Self::new(region, access_key, secret_key);
        config.security_token = setting("security_token", SECURITY_TOKEN_VARS);

        if let Some(protocol) = attributes.get("protocol").and_then(Value::as_str) {
            match protocol.to_uppercase().as_str() {
                "HTTP" | "HTTPS" => config.protocol = protocol.to_uppercase(),
                other => {
                    return Err(AlicloudError::Config(format!(
                        "protocol must be HTTP or HTTPS, got {}",
                        other
                    )));
                }
            }
        }

        if let Some(endpoints) = attributes.get("endpoints").and_then(Value::as_map) {
            for (product, endpoint) in endpoints {
                if let Some(endpoint) = endpoint.as_str().filter(|s| !s.is_empty()) {
                    config = config.with_endpoint(product, endpoint);
                }
            }
        }

        if let Some(secs) = attributes.get("read_timeout").and_then(Value::as_int) {
            config.read_timeout = secs.max(1) as u64;
        }
        if let Some(secs) = attributes
            .get("client_connect_timeout")
            .and_then(Value::as_int)
        {
            config.client_connect_timeout = secs.max(1) as u64;
        }

        Ok(config)
    }

    /// URL scheme derived from `protocol`
    pub fn scheme(&self) -> &'static str {
        if self.protocol.eq_ignore_ascii_case("HTTP") {
            "http"
        } else {
            "https"
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.client_connect_timeout)
    }
}
