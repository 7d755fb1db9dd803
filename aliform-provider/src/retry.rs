//! Retry-wrapped caller
//!
//! `retry` runs an operation until it succeeds, fails permanently, or the
//! deadline passes. `ApiCall` is the usual way in: it sends one RPC action
//! through the loop and classifies failures with `need_retry`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::{AliyunClient, Product};
use crate::error::{AlicloudError, Result};
use crate::request::RpcRequest;

/// Default bound for a single API call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Linearly growing pause between attempts
///
/// The n-th wait is `first + increment * (n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementalWait {
    first: Duration,
    increment: Duration,
    waits: u32,
}

impl IncrementalWait {
    pub const fn new(first: Duration, increment: Duration) -> Self {
        Self {
            first,
            increment,
            waits: 0,
        }
    }

    pub const fn secs(first: u64, increment: u64) -> Self {
        Self::new(Duration::from_secs(first), Duration::from_secs(increment))
    }

    /// Length of the next pause
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.first + self.increment * self.waits;
        self.waits += 1;
        wait
    }
}

impl Default for IncrementalWait {
    fn default() -> Self {
        Self::secs(3, 3)
    }
}

/// Outcome classification of a failed attempt
#[derive(Debug)]
pub enum RetryError<E> {
    Retryable(E),
    NonRetryable(E),
}

/// Run `op` until it succeeds, fails with `NonRetryable`, or `timeout` passes
///
/// After a retryable failure the loop sleeps for the next wait, clamped to
/// the time left. The second attempt always happens; later attempts only
/// while time remains. When the deadline is reached the last error is returned.
pub async fn retry<T, E, F, Fut>(
    timeout: Duration,
    mut wait: IncrementalWait,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RetryError<E>>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(RetryError::NonRetryable(err)) => return Err(err),
            Err(RetryError::Retryable(err)) => err,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if attempts > 1 && remaining.is_zero() {
            return Err(err);
        }
        tokio::time::sleep(wait.next_wait().min(remaining)).await;
    }
}

/// One RPC action sent through the retry loop
#[derive(Debug, Clone)]
pub struct ApiCall {
    product: Product,
    action: String,
    request: RpcRequest,
    query: Option<RpcRequest>,
    timeout: Duration,
    wait: IncrementalWait,
    retry_codes: Vec<String>,
    autoretry: bool,
    endpoint: Option<String>,
}

impl ApiCall {
    pub fn new(product: Product, action: impl Into<String>, request: RpcRequest) -> Self {
        Self {
            product,
            action: action.into(),
            request,
            query: None,
            timeout: DEFAULT_CALL_TIMEOUT,
            wait: IncrementalWait::default(),
            retry_codes: Vec::new(),
            autoretry: false,
            endpoint: None,
        }
    }

    pub fn query(mut self, query: RpcRequest) -> Self {
        self.query = Some(query);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn wait(mut self, wait: IncrementalWait) -> Self {
        self.wait = wait;
        self
    }

    /// Extra error codes treated as transient for this call only
    pub fn retry_on(mut self, codes: &[&str]) -> Self {
        self.retry_codes.extend(codes.iter().map(|c| c.to_string()));
        self
    }

    pub fn autoretry(mut self, autoretry: bool) -> Self {
        self.autoretry = autoretry;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    fn is_retryable(&self, err: &AlicloudError) -> bool {
        if err.need_retry() {
            return true;
        }
        let codes: Vec<&str> = self.retry_codes.iter().map(String::as_str).collect();
        err.is_expected(&codes)
    }

    /// Send the action, retrying transient failures until the call's timeout
    pub async fn send(&self, client: &AliyunClient) -> Result<serde_json::Value> {
        let mut invocation = client.invocation(
            &self.product,
            &self.action,
            self.query.as_ref(),
            &self.request,
            self.autoretry,
        );
        if let Some(endpoint) = &self.endpoint {
            invocation.endpoint = endpoint.clone();
        }

        let invocation = &invocation;
        retry(self.timeout, self.wait, move || async move {
            match client.invoke(invocation).await {
                Ok(response) => Ok(response),
                Err(err) if self.is_retryable(&err) => {
                    log::warn!("Retrying {} {}: {}", self.product.code, self.action, err);
                    Err(RetryError::Retryable(err))
                }
                Err(err) => Err(RetryError::NonRetryable(err)),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::client::ECD;
    use crate::testing::mock_client;

    #[test]
    fn incremental_wait_grows_linearly() {
        let mut wait = IncrementalWait::secs(3, 2);
        assert_eq!(wait.next_wait(), Duration::from_secs(3));
        assert_eq!(wait.next_wait(), Duration::from_secs(5));
        assert_eq!(wait.next_wait(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: std::result::Result<&str, &str> =
            retry(Duration::from_secs(60), IncrementalWait::secs(1, 1), || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(RetryError::Retryable("throttled"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_returns_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: std::result::Result<(), &str> =
            retry(Duration::from_secs(60), IncrementalWait::default(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RetryError::NonRetryable("invalid"))
                }
            })
            .await;

        assert_eq!(result, Err("invalid"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_deadline_with_last_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let start = Instant::now();

        let result: std::result::Result<(), u32> =
            retry(Duration::from_secs(10), IncrementalWait::secs(3, 3), || {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(RetryError::Retryable(attempt))
                }
            })
            .await;

        // attempts at t=0, 3, 9 and (clamped) 10
        assert_eq!(result, Err(4));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_still_retries_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: std::result::Result<(), &str> =
            retry(Duration::ZERO, IncrementalWait::default(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RetryError::Retryable("busy"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn api_call_retries_throttling_then_succeeds() {
        let (client, transport) = mock_client();
        transport.fail("DescribeNetworkPackages", "Throttling.User", 400);
        transport.respond("DescribeNetworkPackages", json!({"NetworkPackages": []}));

        let response = ApiCall::new(ECD, "DescribeNetworkPackages", RpcRequest::new())
            .send(&client)
            .await
            .unwrap();

        assert_eq!(response, json!({"NetworkPackages": []}));
        assert_eq!(transport.calls_for("DescribeNetworkPackages").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn api_call_extra_codes_are_retryable() {
        let (client, transport) = mock_client();
        transport.fail("ModifyPolicyGroup", "InvalidPolicyStatus.Modification", 400);
        transport.respond("ModifyPolicyGroup", json!({}));

        ApiCall::new(ECD, "ModifyPolicyGroup", RpcRequest::new())
            .retry_on(&["InvalidPolicyStatus.Modification"])
            .send(&client)
            .await
            .unwrap();

        assert_eq!(transport.calls_for("ModifyPolicyGroup").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn api_call_fatal_error_is_not_retried() {
        let (client, transport) = mock_client();
        transport.fail("CreateNetworkPackage", "InvalidParameter", 400);

        let err = ApiCall::new(ECD, "CreateNetworkPackage", RpcRequest::new())
            .send(&client)
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("InvalidParameter"));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn api_call_endpoint_override() {
        let (client, transport) = mock_client();
        transport.respond("OpenOnsService", json!({}));

        ApiCall::new(ECD, "OpenOnsService", RpcRequest::new())
            .endpoint("ons.example.com")
            .send(&client)
            .await
            .unwrap();

        assert_eq!(transport.calls()[0].endpoint, "ons.example.com");
    }
}
