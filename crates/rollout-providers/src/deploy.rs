//! Stack deploy boundary.
//!
//! The orchestration core never talks to a cloud API directly. It hands a
//! stack name to a [`StackDeployer`] and gets back the stack's live outputs.
//! How the stack is actually materialized (CDK, raw templates, a shell
//! script) is the implementation's business.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Live outputs of a deployed stack, as reported by the deploy operation.
///
/// Outputs are keyed by export name. `already_current` is set when the
/// provider found nothing to change; the orchestrator uses it to report
/// idempotent re-runs without counting them as mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs {
    /// Exported output values, keyed by name.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// True when the stack was already up to date and no mutation occurred.
    #[serde(default)]
    pub already_current: bool,
}

impl StackOutputs {
    /// Empty output set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper for tests and fakes.
    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Mark these outputs as coming from an up-to-date stack.
    pub fn unchanged(mut self) -> Self {
        self.already_current = true;
        self
    }

    /// Look up a single output value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

/// Deploys one named stack and reports its outputs.
///
/// Guarantees required of implementations:
/// - Deploying an already-current stack is a no-op success with
///   `already_current = true` (safe to re-run at any point of a partially
///   completed rollout).
/// - Errors carry enough classification for the retry layer via
///   [`crate::ProviderError::kind`].
#[async_trait]
pub trait StackDeployer: Send + Sync {
    /// Deploy `stack_name` and return its live outputs.
    async fn deploy(&self, stack_name: &str) -> ProviderResult<StackOutputs>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_lookup() {
        let outputs = StackOutputs::new()
            .with_output("ApiUrl", "https://api.example.com/prod")
            .with_output("TableName", "instances");

        assert_eq!(outputs.get("ApiUrl"), Some("https://api.example.com/prod"));
        assert_eq!(outputs.get("TableName"), Some("instances"));
        assert_eq!(outputs.get("Missing"), None);
        assert!(!outputs.already_current);
    }

    #[test]
    fn test_unchanged_marker() {
        let outputs = StackOutputs::new().with_output("ApiUrl", "x").unchanged();
        assert!(outputs.already_current);
        assert_eq!(outputs.get("ApiUrl"), Some("x"));
    }
}
