//! Error types for Alibaba Cloud operations
//!
//! Every failure is classified as transient (retry), not-found (absence) or
//! fatal. Classification looks through the `Action` context wrapper so callers
//! can add context without losing it.

use std::time::Duration;

use aliform_core::provider::{ErrorKind, ProviderError};
use thiserror::Error;

/// API error codes that mean "the object does not exist"
const NOT_FOUND_CODES: &[&str] = &[
    "EntityNotExist",
    "EntityNotExist.Group",
    "EntityNotExist.Group.Policy",
    "InvalidResourceId.NotFound",
    "InvalidDesktopId.NotFound",
    "InvalidPolicyGroupId.NotFound",
    "InvalidNetworkPackageId.NotFound",
    "ResourceNotFound",
    "NotFound",
];

/// API error codes that are always safe to retry
const THROTTLING_CODES: &[&str] = &[
    "ServiceUnavailable",
    "Rejected.Throttling",
    "SystemBusy",
    "QPS Limit Exceeded",
    "LastTokenProcessing",
    "UnknownError",
    "InternalError",
];

/// Errors that can occur when talking to Alibaba Cloud
#[derive(Debug, Error)]
pub enum AlicloudError {
    /// Error envelope returned by the remote API
    #[error("{code}: {message} (RequestId: {request_id}, HTTP {status})")]
    Api {
        code: String,
        message: String,
        request_id: String,
        status: u16,
    },

    /// Network or HTTP layer failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote object does not exist
    #[error("The specified {resource} {id} is not found")]
    NotFound { resource: String, id: String },

    /// A path expression did not resolve in the response
    #[error("Response has no attribute at path {path}")]
    AttributeMissing { path: String },

    /// The object did not reach the expected status before the deadline
    #[error("Waiting for {id} timed out after {timeout:?}: expected {expected}, got {actual}")]
    WaitTimeout {
        id: String,
        timeout: Duration,
        expected: String,
        actual: String,
    },

    /// The object entered a status it cannot recover from
    #[error("Resource {id} failed to reach target status, current status: {status}")]
    FailedToReachTargetStatus { id: String, status: String },

    /// A composite identifier did not have the expected shape
    #[error("Invalid resource id {id}, expected {expected}")]
    InvalidId { id: String, expected: String },

    /// A required resource attribute is missing from the configuration
    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    /// The requested change cannot be applied in place
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Provider configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Context wrapper naming the resource and the action that failed
    #[error("Resource {id} {action} failed: {source}")]
    Action {
        id: String,
        action: String,
        #[source]
        source: Box<AlicloudError>,
    },
}

impl AlicloudError {
    /// Create a not-found error for a product/resource label
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Wrap this error with the resource ID and action that produced it
    pub fn with_action(self, id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Action {
            id: id.into(),
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &AlicloudError {
        match self {
            Self::Action { source, .. } => source.root(),
            other => other,
        }
    }

    /// The API error code, if this is (or wraps) an API error
    pub fn code(&self) -> Option<&str> {
        match self.root() {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the API error code is one of `codes`
    pub fn is_expected(&self, codes: &[&str]) -> bool {
        self.code().is_some_and(|code| codes.contains(&code))
    }

    /// Whether this error means the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Self::NotFound { .. } => true,
            Self::Api { code, status, .. } => {
                NOT_FOUND_CODES.contains(&code.as_str())
                    || code.ends_with(".NotFound")
                    || (*status == 404 && code.is_empty())
            }
            _ => false,
        }
    }

    /// Whether the failure is transient and the call may be retried
    pub fn need_retry(&self) -> bool {
        match self.root() {
            Self::Transport(_) => true,
            Self::Api {
                code,
                message,
                status,
                ..
            } => {
                code.contains("Throttling")
                    || THROTTLING_CODES.contains(&code.as_str())
                    || message.contains("QPS Limit Exceeded")
                    || *status >= 500
            }
            _ => false,
        }
    }

    /// Host-facing classification
    pub fn kind(&self) -> ErrorKind {
        if self.is_not_found() {
            ErrorKind::NotFound
        } else if matches!(self.root(), Self::WaitTimeout { .. }) {
            ErrorKind::Timeout
        } else if self.need_retry() {
            ErrorKind::Transient
        } else {
            ErrorKind::Fatal
        }
    }
}

impl From<serde_json::Error> for AlicloudError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<AlicloudError> for ProviderError {
    fn from(err: AlicloudError) -> Self {
        let kind = err.kind();
        ProviderError::new(err.to_string())
            .with_kind(kind)
            .with_cause(err)
    }
}

/// Result type for Alibaba Cloud operations
pub type Result<T> = std::result::Result<T, AlicloudError>;
