//! RPC transport - Signed HTTP calls to Alibaba Cloud RPC endpoints

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use super::signer::{self, SIGNATURE_METHOD, SIGNATURE_VERSION};
use crate::config::ProviderConfig;
use crate::error::{AlicloudError, Result};

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 512;

/// Extra attempts for requests that fail before reaching the server
const NETWORK_RETRIES: u32 = 3;

/// One RPC action, ready to be sent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcInvocation {
    /// Host name, or a full base URL (used as-is when it has a scheme)
    pub endpoint: String,
    pub product: String,
    pub version: String,
    pub action: String,
    /// Added as `RegionId` when the request does not carry one
    pub region_id: String,
    pub query: BTreeMap<String, String>,
    pub body: BTreeMap<String, String>,
    /// Retry pure network failures inside the transport
    pub autoretry: bool,
}

/// Sends RPC invocations and decodes the JSON response
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, invocation: &RpcInvocation) -> Result<serde_json::Value>;
}

/// Truncate long bodies before they reach the log
pub(crate) fn truncate_for_log(body: &str) -> String {
    if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    }
}

/// reqwest-backed transport using access key signing
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    access_key: String,
    secret_key: String,
    security_token: Option<String>,
    scheme: &'static str,
}

impl HttpTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("aliform-provider/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| AlicloudError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            security_token: config.security_token.clone(),
            scheme: config.scheme(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("{}://{}", self.scheme, endpoint)
        };
        format!("{}/", base)
    }

    /// Common parameters plus the caller's query, signed together with the body
    fn signed_query(&self, invocation: &RpcInvocation) -> Result<BTreeMap<String, String>> {
        let mut query = invocation.query.clone();
        query.insert("Format".to_string(), "JSON".to_string());
        query.insert("Version".to_string(), invocation.version.clone());
        query.insert("Action".to_string(), invocation.action.clone());
        query.insert("AccessKeyId".to_string(), self.access_key.clone());
        query.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
        query.insert("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string());
        query.insert("SignatureNonce".to_string(), uuid::Uuid::new_v4().to_string());
        query.insert(
            "Timestamp".to_string(),
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        if let Some(token) = &self.security_token {
            query.insert("SecurityToken".to_string(), token.clone());
        }

        let mut all = query.clone();
        all.extend(
            invocation
                .body
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let signature = signer::sign("POST", &all, &self.secret_key)?;
        query.insert("Signature".to_string(), signature);
        Ok(query)
    }

    async fn send_once(&self, invocation: &RpcInvocation) -> Result<serde_json::Value> {
        let query = self.signed_query(invocation)?;
        let url = format!(
            "{}?{}",
            self.url(&invocation.endpoint),
            signer::canonicalized_query(&query)
        );
        let body = signer::canonicalized_query(&invocation.body);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| AlicloudError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AlicloudError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            log::debug!(
                "{} {} returned {}: {}",
                invocation.product,
                invocation.action,
                status,
                truncate_for_log(&text)
            );
            return Err(api_error(status.as_u16(), &text));
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            AlicloudError::Serialization(format!("Failed to parse response JSON: {}", e))
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, invocation: &RpcInvocation) -> Result<serde_json::Value> {
        let mut invocation = invocation.clone();
        if !invocation.region_id.is_empty()
            && !invocation.query.contains_key("RegionId")
            && !invocation.body.contains_key("RegionId")
        {
            invocation
                .body
                .insert("RegionId".to_string(), invocation.region_id.clone());
        }

        let attempts = if invocation.autoretry {
            NETWORK_RETRIES + 1
        } else {
            1
        };
        let mut attempt = 1;
        loop {
            match self.send_once(&invocation).await {
                Err(AlicloudError::Transport(msg)) if attempt < attempts => {
                    log::debug!(
                        "{} {} network failure (attempt {}/{}): {}",
                        invocation.product,
                        invocation.action,
                        attempt,
                        attempts,
                        msg
                    );
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                result => return result,
            }
        }
    }
}

/// Decode an error envelope; bodies that are not JSON keep the HTTP status only
fn api_error(status: u16, body: &str) -> AlicloudError {
    let envelope: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let field = |name: &str| {
        envelope
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let message = match field("Message") {
        m if m.is_empty() => truncate_for_log(body),
        m => m,
    };

    AlicloudError::Api {
        code: field("Code"),
        message,
        request_id: field("RequestId"),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(security_token: Option<&str>) -> HttpTransport {
        let mut config = ProviderConfig::new("cn-hangzhou", "ak", "sk");
        config.security_token = security_token.map(str::to_string);
        HttpTransport::new(&config).unwrap()
    }

    #[test]
    fn urls_use_scheme_unless_endpoint_has_one() {
        let transport = transport(None);
        assert_eq!(
            transport.url("ecd.cn-hangzhou.aliyuncs.com"),
            "https://ecd.cn-hangzhou.aliyuncs.com/"
        );
        assert_eq!(transport.url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080/");
    }

    #[test]
    fn signed_query_carries_common_parameters() {
        let transport = transport(Some("sts-token"));
        let invocation = RpcInvocation {
            product: "ecd".to_string(),
            version: "2020-09-30".to_string(),
            action: "DescribeDesktops".to_string(),
            ..Default::default()
        };

        let query = transport.signed_query(&invocation).unwrap();

        assert_eq!(query["Action"], "DescribeDesktops");
        assert_eq!(query["Version"], "2020-09-30");
        assert_eq!(query["Format"], "JSON");
        assert_eq!(query["AccessKeyId"], "ak");
        assert_eq!(query["SignatureMethod"], "HMAC-SHA1");
        assert_eq!(query["SignatureVersion"], "1.0");
        assert_eq!(query["SecurityToken"], "sts-token");
        assert!(query["Timestamp"].ends_with('Z'));
        assert!(query.contains_key("SignatureNonce"));
        assert!(query.contains_key("Signature"));
    }

    #[test]
    fn api_error_decodes_envelope() {
        let err = api_error(
            404,
            r#"{"Code": "EntityNotExist.Group", "Message": "The group does not exist", "RequestId": "r-1"}"#,
        );
        match err {
            AlicloudError::Api {
                code,
                request_id,
                status,
                ..
            } => {
                assert_eq!(code, "EntityNotExist.Group");
                assert_eq!(request_id, "r-1");
                assert_eq!(status, 404);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn api_error_without_envelope_keeps_status() {
        let err = api_error(502, "Bad Gateway");
        assert!(err.need_retry());
        assert_eq!(err.code(), Some(""));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let logged = truncate_for_log(&body);
        assert!(logged.len() < 600);
        assert!(logged.ends_with("[truncated, 2000 bytes total]"));
    }
}
