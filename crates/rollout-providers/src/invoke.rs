//! Endpoint and function invocation boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Response from invoking an endpoint or function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// HTTP status code, or the HTTP-equivalent status a function invoker maps to.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl InvokeResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx response.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401/403-equivalent rejection.
    pub fn is_auth_rejected(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// Calls a live target (HTTP endpoint or function) with a bounded timeout.
///
/// Implementations return `Ok` for any response the target produced,
/// whatever its status; `Err` is reserved for transport-level failures
/// (network, timeout) and invoker-side auth rejections that never reach
/// the target.
#[async_trait]
pub trait EndpointInvoker: Send + Sync {
    /// Invoke `target` with an optional JSON payload.
    async fn call(
        &self,
        target: &str,
        payload: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> ProviderResult<InvokeResponse>;
}
