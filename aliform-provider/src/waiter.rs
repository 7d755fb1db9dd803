//! State poller
//!
//! `StateWaiter` polls a refresh function until the remote object reaches a
//! target status, enters a failure status, or the deadline passes.
//! `wait_all` runs several boolean pollers concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::{AlicloudError, Result};
use crate::extract::value_to_string;

/// Default pause between two refreshes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What the poller waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    /// Status is one of these
    Reached(Vec<String>),
    /// Status is none of these pending statuses
    Settled(Vec<String>),
    /// The object no longer exists
    Deleted,
    /// The object exists, whatever its status; absence keeps polling
    Exists,
}

impl WaitTarget {
    pub fn reached(statuses: &[&str]) -> Self {
        Self::Reached(statuses.iter().map(|s| s.to_string()).collect())
    }

    pub fn settled(pending: &[&str]) -> Self {
        Self::Settled(pending.iter().map(|s| s.to_string()).collect())
    }

    fn is_met_by(&self, status: &str) -> bool {
        match self {
            Self::Reached(statuses) => statuses.iter().any(|s| s == status),
            Self::Settled(pending) => !pending.iter().any(|s| s == status),
            Self::Deleted => false,
            Self::Exists => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Reached(statuses) => statuses.join("|"),
            Self::Settled(pending) => format!("not {}", pending.join("|")),
            Self::Deleted => "deleted".to_string(),
            Self::Exists => "exists".to_string(),
        }
    }
}

/// Result of one refresh: the object and its status, or `None` when it is gone
pub type Refreshed = Option<(Value, String)>;

/// Turn a describe result into a refresh result
///
/// Not-found becomes `None`; the status is read from `status_field`.
pub fn refresh_status(described: Result<Value>, status_field: &str) -> Result<Refreshed> {
    match described {
        Ok(object) => {
            let status = object
                .get(status_field)
                .map(value_to_string)
                .unwrap_or_default();
            Ok(Some((object, status)))
        }
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Polls one remote object until it reaches a target
#[derive(Debug, Clone)]
pub struct StateWaiter {
    id: String,
    target: WaitTarget,
    fail_statuses: Vec<String>,
    timeout: Duration,
    interval: Duration,
}

impl StateWaiter {
    pub fn new(id: impl Into<String>, target: WaitTarget, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            target,
            fail_statuses: Vec::new(),
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Statuses the object cannot recover from
    pub fn fail_on(mut self, statuses: &[&str]) -> Self {
        self.fail_statuses = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll `refresh` until the target is met
    ///
    /// The first refresh happens immediately. Returns the final object, or
    /// `None` when waiting for deletion.
    pub async fn wait<F, Fut>(&self, mut refresh: F) -> Result<Option<Value>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Refreshed>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_status;

        loop {
            match refresh().await? {
                None if self.target == WaitTarget::Deleted => return Ok(None),
                None if self.target == WaitTarget::Exists => {
                    log::debug!("Waiting for {} to appear", self.id);
                    last_status = "absent".to_string();
                }
                None => return Err(AlicloudError::not_found("object", self.id.clone())),
                Some((object, status)) => {
                    if self.fail_statuses.contains(&status) {
                        return Err(AlicloudError::FailedToReachTargetStatus {
                            id: self.id.clone(),
                            status,
                        });
                    }
                    if self.target.is_met_by(&status) {
                        return Ok(Some(object));
                    }
                    log::debug!("Waiting for {}: status {}", self.id, status);
                    last_status = status;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AlicloudError::WaitTimeout {
                    id: self.id.clone(),
                    timeout: self.timeout,
                    expected: self.target.describe(),
                    actual: last_status,
                });
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}

/// Run keyed pollers concurrently and collect each outcome under its key
pub async fn wait_all<K, Fut, I>(pollers: I) -> HashMap<K, bool>
where
    K: Eq + Hash,
    Fut: Future<Output = bool>,
    I: IntoIterator<Item = (K, Fut)>,
{
    let (keys, futures): (Vec<K>, Vec<Fut>) = pollers.into_iter().unzip();
    let outcomes = join_all(futures).await;
    keys.into_iter().zip(outcomes).collect()
}
