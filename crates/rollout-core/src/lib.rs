//! Rollout Orchestration Core
//!
//! Sequences interdependent infrastructure stacks in dependency waves,
//! propagates shared secrets between them, verifies cross-account trust,
//! and probes the resulting endpoints before declaring success.
//!
//! All cloud interaction happens behind the `rollout-providers` traits;
//! this crate owns only ordering, retry, containment, and reporting.

pub mod context;
pub mod error;
pub mod graph;
pub mod obs;
pub mod orchestrator;
pub mod plan;
pub mod probe;
pub mod report;
pub mod retry;
pub mod secrets;
pub mod telemetry;
pub mod trust;

pub use context::{RunContext, ENV_ACCOUNT_ID, ENV_ENVIRONMENT, ENV_REGION};
pub use error::{
    ContextError, DeployError, FailureCategory, PlanError, PlanResult, ProvisionError, TrustError,
};
pub use graph::StackGraph;
pub use orchestrator::{CancelSignal, Orchestrator, RunOptions, DEFAULT_WAVE_CONCURRENCY};
pub use plan::{DeploymentPlan, PlanDigest, PlanFile, StackDescriptor, StackEntry, StackStatus};
pub use probe::{ExpectedOutcome, ProbeEngine, ProbeOutcome, ProbeResult, ProbeSpec};
pub use report::{
    RunOutcome, RunReport, SecretReport, StackReport, TrustReport, EXIT_FAILURE, EXIT_INVALID_PLAN,
    EXIT_MISSING_PREREQUISITE, EXIT_OK,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use secrets::{ProvisionOutcome, SecretBinding, SecretProvisioner, SecretTransform};
pub use telemetry::init_tracing;
pub use trust::{TrustRelationship, TrustValidator, VERIFY_SESSION_NAME};

/// Rollout version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
