//! Error taxonomy for provider operations.
//!
//! Every collaborator call surfaces a [`ProviderError`]. The coarse
//! [`ProviderErrorKind`] classification is what the orchestration core's
//! retry layer keys on: transient kinds are retried with backoff, everything
//! else fails the operation immediately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Rate limited by the provider API.
    Throttled,
    /// Transport-level network failure.
    Network,
    /// The call exceeded its deadline.
    Timeout,
    /// The caller lacks permission for the operation.
    AccessDenied,
    /// The referenced resource does not exist.
    NotFound,
    /// The stack definition itself is rejected by the provider.
    InvalidTemplate,
    /// The call was rejected by an authorizer (401/403-equivalent).
    AuthRejected,
    /// Anything the provider reported that fits no other bucket.
    Other,
}

impl ProviderErrorKind {
    /// Whether an error of this kind is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Throttled | ProviderErrorKind::Network | ProviderErrorKind::Timeout
        )
    }
}

/// Errors produced by provider collaborators.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("rate limited by provider: {detail}")]
    Throttled { detail: String },

    #[error("network error: {detail}")]
    Network { detail: String },

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("access denied: {detail}")]
    AccessDenied { detail: String },

    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    #[error("invalid template for stack {stack}: {detail}")]
    InvalidTemplate { stack: String, detail: String },

    #[error("authorization rejected: {detail}")]
    AuthRejected { detail: String },

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Classify this error for the retry layer.
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Throttled { .. } => ProviderErrorKind::Throttled,
            ProviderError::Network { .. } => ProviderErrorKind::Network,
            ProviderError::Timeout { .. } => ProviderErrorKind::Timeout,
            ProviderError::AccessDenied { .. } => ProviderErrorKind::AccessDenied,
            ProviderError::NotFound { .. } => ProviderErrorKind::NotFound,
            ProviderError::InvalidTemplate { .. } => ProviderErrorKind::InvalidTemplate,
            ProviderError::AuthRejected { .. } => ProviderErrorKind::AuthRejected,
            ProviderError::Other(_) => ProviderErrorKind::Other,
        }
    }

    /// Whether this error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
