//! Post-deploy health probes.
//!
//! A probe calls a live endpoint or function and classifies the result
//! against the outcome the operator declared. The engine never raises:
//! whatever goes wrong becomes a `Fail` result with the cause in `detail`,
//! so one bad probe cannot abort the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use rollout_providers::{EndpointInvoker, ProviderErrorKind};

/// What a successful probe looks like for a given target.
///
/// Some endpoints are intentionally locked down: for those, receiving an
/// authentication rejection is itself the success signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    /// The call should succeed (2xx-equivalent).
    Success,
    /// The call should be rejected with a 401/403-equivalent.
    AuthRequired,
}

/// Declarative description of one health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Display name for the report.
    pub name: String,
    /// Endpoint URL or function identifier.
    pub target: String,
    /// What counts as healthy for this target.
    pub expected_outcome: ExpectedOutcome,
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Optional JSON payload for function-style targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ProbeSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Classified probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Pass,
    Fail,
    /// The target is less protected than intended: it accepted a call that
    /// should have been rejected.
    Warn,
}

/// Immutable record of one probe execution.
///
/// A re-probe produces a new result; an old one is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub spec: ProbeSpec,
    pub outcome: ProbeOutcome,
    pub latency_ms: u64,
    pub detail: String,
    /// Provider-side failure classification, when the call never produced
    /// a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<ProviderErrorKind>,
}

impl ProbeResult {
    pub fn passed(&self) -> bool {
        self.outcome == ProbeOutcome::Pass
    }
}

/// Runs probes through an [`EndpointInvoker`].
pub struct ProbeEngine {
    invoker: Arc<dyn EndpointInvoker>,
}

impl ProbeEngine {
    pub fn new(invoker: Arc<dyn EndpointInvoker>) -> Self {
        Self { invoker }
    }

    /// Run one probe. Never returns an error.
    pub async fn run(&self, spec: &ProbeSpec) -> ProbeResult {
        let started = Instant::now();
        let response = self
            .invoker
            .call(&spec.target, spec.payload.as_ref(), spec.timeout())
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (outcome, detail, failure_kind) = match response {
            Ok(resp) if resp.is_success() => match spec.expected_outcome {
                ExpectedOutcome::Success => (
                    ProbeOutcome::Pass,
                    format!("target responded with status {}", resp.status),
                    None,
                ),
                ExpectedOutcome::AuthRequired => (
                    ProbeOutcome::Warn,
                    format!(
                        "expected an authentication challenge but the call succeeded with status {}",
                        resp.status
                    ),
                    None,
                ),
            },
            Ok(resp) if resp.is_auth_rejected() => match spec.expected_outcome {
                ExpectedOutcome::AuthRequired => (
                    ProbeOutcome::Pass,
                    format!("target rejected the call with status {} as intended", resp.status),
                    None,
                ),
                ExpectedOutcome::Success => (
                    ProbeOutcome::Fail,
                    format!("target rejected the call with status {}", resp.status),
                    None,
                ),
            },
            Ok(resp) => (
                ProbeOutcome::Fail,
                format!("target responded with unexpected status {}", resp.status),
                None,
            ),
            Err(err) if err.kind() == ProviderErrorKind::AuthRejected => {
                match spec.expected_outcome {
                    ExpectedOutcome::AuthRequired => (
                        ProbeOutcome::Pass,
                        "invoker rejected the call for missing authorization, as intended"
                            .to_string(),
                        None,
                    ),
                    ExpectedOutcome::Success => {
                        (ProbeOutcome::Fail, err.to_string(), Some(err.kind()))
                    }
                }
            }
            Err(err) => (
                ProbeOutcome::Fail,
                format!("call failed: {err}"),
                Some(err.kind()),
            ),
        };

        info!(
            event = "probe.completed",
            probe = %spec.name,
            outcome = ?outcome,
            latency_ms = latency_ms,
        );

        ProbeResult {
            spec: spec.clone(),
            outcome,
            latency_ms,
            detail,
            failure_kind,
        }
    }

    /// Run every probe concurrently; results keep the input order.
    pub async fn run_all(&self, specs: &[ProbeSpec]) -> Vec<ProbeResult> {
        join_all(specs.iter().map(|spec| self.run(spec))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_providers::fakes::MemoryInvoker;
    use rollout_providers::{InvokeResponse, ProviderError};

    fn spec(name: &str, target: &str, expected: ExpectedOutcome) -> ProbeSpec {
        ProbeSpec {
            name: name.to_string(),
            target: target.to_string(),
            expected_outcome: expected,
            timeout_ms: 1_000,
            payload: None,
        }
    }

    #[tokio::test]
    async fn test_success_expected_and_received_passes() {
        let invoker = Arc::new(MemoryInvoker::new());
        invoker.respond(
            "https://api/instances",
            InvokeResponse::new(200, r#"{"instances": []}"#),
        );

        let engine = ProbeEngine::new(invoker);
        let result = engine
            .run(&spec("instances", "https://api/instances", ExpectedOutcome::Success))
            .await;
        assert_eq!(result.outcome, ProbeOutcome::Pass);
    }

    #[tokio::test]
    async fn test_auth_required_and_rejected_passes() {
        let invoker = Arc::new(MemoryInvoker::new());
        invoker.respond("https://api/admin", InvokeResponse::new(401, "unauthorized"));

        let engine = ProbeEngine::new(invoker);
        let result = engine
            .run(&spec("admin", "https://api/admin", ExpectedOutcome::AuthRequired))
            .await;
        assert_eq!(result.outcome, ProbeOutcome::Pass);
        assert!(result.detail.contains("401"));
    }

    #[tokio::test]
    async fn test_auth_required_but_open_endpoint_warns() {
        let invoker = Arc::new(MemoryInvoker::new());
        invoker.respond("https://api/admin", InvokeResponse::new(200, "welcome"));

        let engine = ProbeEngine::new(invoker);
        let result = engine
            .run(&spec("admin", "https://api/admin", ExpectedOutcome::AuthRequired))
            .await;
        assert_eq!(result.outcome, ProbeOutcome::Warn);
    }

    #[tokio::test]
    async fn test_server_error_fails() {
        let invoker = Arc::new(MemoryInvoker::new());
        invoker.respond("https://api/instances", InvokeResponse::new(500, "boom"));

        let engine = ProbeEngine::new(invoker);
        let result = engine
            .run(&spec("instances", "https://api/instances", ExpectedOutcome::Success))
            .await;
        assert_eq!(result.outcome, ProbeOutcome::Fail);
        assert!(result.detail.contains("500"));
    }

    #[tokio::test]
    async fn test_rejected_call_when_success_expected_fails() {
        let invoker = Arc::new(MemoryInvoker::new());
        invoker.respond("https://api/instances", InvokeResponse::new(403, "forbidden"));

        let engine = ProbeEngine::new(invoker);
        let result = engine
            .run(&spec("instances", "https://api/instances", ExpectedOutcome::Success))
            .await;
        assert_eq!(result.outcome, ProbeOutcome::Fail);
    }

    #[tokio::test]
    async fn test_invoker_error_becomes_fail_result() {
        let invoker = Arc::new(MemoryInvoker::new());
        invoker.fail(
            "https://api/instances",
            ProviderError::Network {
                detail: "connection refused".to_string(),
            },
        );

        let engine = ProbeEngine::new(invoker);
        let result = engine
            .run(&spec("instances", "https://api/instances", ExpectedOutcome::Success))
            .await;
        assert_eq!(result.outcome, ProbeOutcome::Fail);
        assert_eq!(result.failure_kind, Some(ProviderErrorKind::Network));
        assert!(result.detail.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_target_records_not_found_kind() {
        let invoker = Arc::new(MemoryInvoker::new());
        let engine = ProbeEngine::new(invoker);
        let result = engine
            .run(&spec("ghost", "https://api/ghost", ExpectedOutcome::Success))
            .await;
        assert_eq!(result.outcome, ProbeOutcome::Fail);
        assert_eq!(result.failure_kind, Some(ProviderErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order_and_isolates_failures() {
        let invoker = Arc::new(MemoryInvoker::new());
        invoker.respond("https://api/a", InvokeResponse::new(200, "ok"));
        invoker.fail(
            "https://api/b",
            ProviderError::Network {
                detail: "reset".to_string(),
            },
        );
        invoker.respond("https://api/c", InvokeResponse::new(200, "ok"));

        let engine = ProbeEngine::new(invoker);
        let results = engine
            .run_all(&[
                spec("a", "https://api/a", ExpectedOutcome::Success),
                spec("b", "https://api/b", ExpectedOutcome::Success),
                spec("c", "https://api/c", ExpectedOutcome::Success),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome, ProbeOutcome::Pass);
        assert_eq!(results[1].outcome, ProbeOutcome::Fail);
        assert_eq!(results[2].outcome, ProbeOutcome::Pass);
    }
}
