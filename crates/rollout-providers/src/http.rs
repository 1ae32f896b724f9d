//! HTTP-backed endpoint invoker.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::invoke::{EndpointInvoker, InvokeResponse};

/// [`EndpointInvoker`] over HTTP(S).
///
/// A request with a payload is POSTed as JSON; without one it is a plain GET.
/// Any response the server produced is returned as `Ok`, whatever the status;
/// only transport failures become errors.
pub struct HttpInvoker {
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointInvoker for HttpInvoker {
    async fn call(
        &self,
        target: &str,
        payload: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> ProviderResult<InvokeResponse> {
        let request = match payload {
            Some(body) => self.client.post(target).json(body),
            None => self.client.get(target),
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, timeout))?;

        debug!(target = %target, status = status, "endpoint call finished");
        Ok(InvokeResponse { status, body })
    }
}

fn classify_transport_error(error: &reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        ProviderError::Network {
            detail: error.to_string(),
        }
    }
}
