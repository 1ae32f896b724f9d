//! Error taxonomy for the orchestration core.
//!
//! Failures are contained to the smallest unit they affect: a plan error
//! aborts the run before any deploy, a deploy error fails one stack and its
//! dependents, a binding/relationship error fails only that binding or
//! relationship, and probe outcomes are never errors at all.

use rollout_providers::ProviderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that invalidate a deployment plan before any deploy is attempted.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("dependency cycle detected involving stacks: {stacks:?}")]
    DependencyCycle { stacks: Vec<String> },

    #[error("stack {stack} depends on unknown stack {dependency}")]
    UnknownDependency { stack: String, dependency: String },

    #[error("stack declared more than once: {stack}")]
    DuplicateStack { stack: String },

    #[error("secret binding for {secret_id} references unknown source stack {stack}")]
    UnknownSourceStack { secret_id: String, stack: String },

    #[error("plan declares no stacks")]
    NoStacks,

    #[error("plan file is not valid JSON: {detail}")]
    Parse { detail: String },
}

/// Result alias for plan construction and validation.
pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// A failed stack deploy, classified for the retry layer.
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    /// Rate limiting or transient network trouble; retried with backoff.
    #[error("transient deploy error for stack {stack}: {detail}")]
    Transient { stack: String, detail: String },

    /// Broken template, denied permission, or anything a retry cannot fix.
    #[error("structural deploy error for stack {stack}: {detail}")]
    Structural { stack: String, detail: String },
}

impl DeployError {
    /// Map a provider error onto the deploy taxonomy for `stack`.
    pub fn from_provider(stack: &str, error: ProviderError) -> Self {
        if error.is_transient() {
            DeployError::Transient {
                stack: stack.to_string(),
                detail: error.to_string(),
            }
        } else {
            DeployError::Structural {
                stack: stack.to_string(),
                detail: error.to_string(),
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DeployError::Transient { .. })
    }
}

/// A failed secret binding execution.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    /// The source stack deployed but produced no such output. Fatal for
    /// this binding; the run continues.
    #[error("source stack {stack} produced no output named {key}")]
    SourceValueMissing { stack: String, key: String },

    /// The secret store could not be reached; retried by the caller.
    #[error("secret store unavailable for {secret_id}: {detail}")]
    StoreUnavailable { secret_id: String, detail: String },
}

impl ProvisionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::StoreUnavailable { .. })
    }
}

/// A failed trust relationship verification.
#[derive(Debug, Clone, Error)]
pub enum TrustError {
    /// The role does not exist in the target account; requires out-of-band
    /// provisioning.
    #[error("role {role_arn} not found in target account")]
    RoleNotFound { role_arn: String },

    /// The role exists but its trust policy rejects this caller/external-id
    /// combination.
    #[error("trust policy for {role_arn} rejects this caller/external-id combination")]
    TrustPolicyMismatch { role_arn: String },

    /// Throttled or network trouble; retried with backoff.
    #[error("transient error verifying {role_arn}: {detail}")]
    Transient { role_arn: String, detail: String },
}

impl TrustError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TrustError::Transient { .. })
    }
}

/// Failure categories surfaced in the run report, one per taxonomy entry.
///
/// Each category maps to exactly one remediation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    PlanInvalid,
    TransientExhausted,
    StructuralDeploy,
    SourceValueMissing,
    StoreUnavailable,
    RoleNotFound,
    TrustPolicyMismatch,
    ProbeFail,
    ProbeWarn,
}

impl FailureCategory {
    /// Operator-facing remediation hint for this category.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            FailureCategory::PlanInvalid => {
                "the dependency graph is invalid; fix the plan file before re-running"
            }
            FailureCategory::TransientExhausted => {
                "retries were exhausted against a rate-limited or unreachable provider; re-run once the provider settles"
            }
            FailureCategory::StructuralDeploy => {
                "the stack template or its permissions were rejected; fix the stack definition, a retry will not help"
            }
            FailureCategory::SourceValueMissing => {
                "the source stack deployed but did not export the expected output; check the stack's output names"
            }
            FailureCategory::StoreUnavailable => {
                "the secret store could not be reached; re-run to retry provisioning"
            }
            FailureCategory::RoleNotFound => {
                "the cross-account role does not exist; provision it in the target account first"
            }
            FailureCategory::TrustPolicyMismatch => {
                "the role exists but its trust policy rejects this caller/external id; update the role's trust policy"
            }
            FailureCategory::ProbeFail => {
                "the endpoint is unhealthy; inspect the backing function's logs"
            }
            FailureCategory::ProbeWarn => {
                "the endpoint accepted an unauthenticated call it was expected to reject; verify its authorizer configuration"
            }
        }
    }
}

impl From<&DeployError> for FailureCategory {
    fn from(error: &DeployError) -> Self {
        match error {
            DeployError::Transient { .. } => FailureCategory::TransientExhausted,
            DeployError::Structural { .. } => FailureCategory::StructuralDeploy,
        }
    }
}

impl From<&ProvisionError> for FailureCategory {
    fn from(error: &ProvisionError) -> Self {
        match error {
            ProvisionError::SourceValueMissing { .. } => FailureCategory::SourceValueMissing,
            ProvisionError::StoreUnavailable { .. } => FailureCategory::StoreUnavailable,
        }
    }
}

impl From<&TrustError> for FailureCategory {
    fn from(error: &TrustError) -> Self {
        match error {
            TrustError::RoleNotFound { .. } => FailureCategory::RoleNotFound,
            TrustError::TrustPolicyMismatch { .. } => FailureCategory::TrustPolicyMismatch,
            TrustError::Transient { .. } => FailureCategory::TransientExhausted,
        }
    }
}

/// Errors building a [`crate::context::RunContext`] from the environment.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("required environment variable not set: {name}")]
    MissingEnvVar { name: String },
}
