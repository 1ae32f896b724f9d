//! Deployment plans: declared stacks, bindings, trust, and probes.
//!
//! A [`PlanFile`] is what operators declare; a [`DeploymentPlan`] is the
//! validated, environment-resolved form the orchestrator executes. The plan
//! is immutable once resolved: waves, ordering, and the content digest are
//! fixed for the whole run, so re-runs of the same declaration are
//! reproducible.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use rollout_providers::CommandProviderConfig;

use crate::context::RunContext;
use crate::error::{PlanError, PlanResult};
use crate::graph::StackGraph;
use crate::probe::ProbeSpec;
use crate::secrets::SecretBinding;
use crate::trust::TrustRelationship;

/// Lifecycle of one stack within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    Pending,
    Deploying,
    Deployed,
    Failed,
    /// Not attempted because an upstream dependency failed.
    Skipped,
}

impl StackStatus {
    /// Whether this status ends the stack's participation in the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StackStatus::Deployed | StackStatus::Failed | StackStatus::Skipped
        )
    }
}

/// One stack in a resolved plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// Environment-scoped stack name.
    pub name: String,
    /// Environment-scoped names of the stacks this one depends on.
    pub depends_on: Vec<String>,
}

/// SHA-256 digest of a resolved plan's normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanDigest(String);

impl PlanDigest {
    fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        PlanDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for PlanDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One declared stack in a plan file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Operator-declared plan document (JSON on disk).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub stacks: Vec<StackEntry>,
    #[serde(default)]
    pub secrets: Vec<SecretBinding>,
    #[serde(default)]
    pub trust: Vec<TrustRelationship>,
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,
    /// Commands backing the provider boundary for this plan.
    #[serde(default)]
    pub providers: CommandProviderConfig,
}

fn default_version() -> u32 {
    1
}

impl PlanFile {
    /// Parse a plan document from JSON text.
    pub fn from_json(text: &str) -> PlanResult<Self> {
        serde_json::from_str(text).map_err(|e| PlanError::Parse {
            detail: e.to_string(),
        })
    }
}

/// Validated, environment-resolved deployment plan.
///
/// Owned by the orchestrator for the duration of one run; nothing mutates it
/// after resolution.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    environment: String,
    digest: PlanDigest,
    /// Descriptors in deterministic topological order.
    stacks: Vec<StackDescriptor>,
    waves: Vec<Vec<String>>,
    bindings: Vec<SecretBinding>,
    trust: Vec<TrustRelationship>,
    probes: Vec<ProbeSpec>,
    graph: StackGraph,
}

impl DeploymentPlan {
    /// Resolve a declared plan against a run context.
    ///
    /// Validation fails fast: a rejected plan never reaches the deploy
    /// phase. Stack, secret, and role names come out scoped with the
    /// context's environment suffix.
    pub fn resolve(file: &PlanFile, context: &RunContext) -> PlanResult<Self> {
        if file.stacks.is_empty() {
            return Err(PlanError::NoStacks);
        }

        let mut graph = StackGraph::new();
        for entry in &file.stacks {
            graph.add_stack(context.scoped_name(&entry.name))?;
        }
        for entry in &file.stacks {
            let dependent = context.scoped_name(&entry.name);
            for dependency in &entry.depends_on {
                graph.add_dependency(&context.scoped_name(dependency), &dependent)?;
            }
        }

        let waves = graph.waves()?;
        let stacks = graph
            .topological_order()?
            .into_iter()
            .map(|name| {
                let depends_on = graph.dependencies_of(&name);
                StackDescriptor { name, depends_on }
            })
            .collect();

        let bindings: Vec<SecretBinding> = file
            .secrets
            .iter()
            .map(|binding| SecretBinding {
                source_stack: context.scoped_name(&binding.source_stack),
                source_key: binding.source_key.clone(),
                target_secret_id: context.scoped_name(&binding.target_secret_id),
                transform: binding.transform,
            })
            .collect();
        for binding in &bindings {
            if !graph.contains(&binding.source_stack) {
                return Err(PlanError::UnknownSourceStack {
                    secret_id: binding.target_secret_id.clone(),
                    stack: binding.source_stack.clone(),
                });
            }
        }

        let trust = file
            .trust
            .iter()
            .map(|rel| rel.scoped(context))
            .collect();

        let digest = Self::digest_of(file, context)?;

        Ok(Self {
            environment: context.environment.clone(),
            digest,
            stacks,
            waves,
            bindings,
            trust,
            probes: file.probes.clone(),
            graph,
        })
    }

    /// Content digest of the declared plan under this environment.
    fn digest_of(file: &PlanFile, context: &RunContext) -> PlanResult<PlanDigest> {
        // Struct serialization has a fixed field order, so the digest is
        // stable regardless of key order in the source document.
        let normalized = serde_json::to_vec(file).map_err(|e| PlanError::Parse {
            detail: e.to_string(),
        })?;
        let mut keyed = context.environment.clone().into_bytes();
        keyed.push(b'\n');
        keyed.extend_from_slice(&normalized);
        Ok(PlanDigest::from_bytes(&keyed))
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn digest(&self) -> &PlanDigest {
        &self.digest
    }

    pub fn stacks(&self) -> &[StackDescriptor] {
        &self.stacks
    }

    pub fn stack_count(&self) -> usize {
        self.stacks.len()
    }

    /// Dependency waves in execution order.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    pub fn bindings(&self) -> &[SecretBinding] {
        &self.bindings
    }

    pub fn trust_relationships(&self) -> &[TrustRelationship] {
        &self.trust
    }

    pub fn probes(&self) -> &[ProbeSpec] {
        &self.probes
    }

    /// All transitive dependents of `stack`.
    pub fn transitive_dependents_of(&self, stack: &str) -> Vec<String> {
        self.graph.transitive_dependents_of(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ExpectedOutcome;

    fn entry(name: &str, deps: &[&str]) -> StackEntry {
        StackEntry {
            name: name.to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn context() -> RunContext {
        RunContext::new("", "111122223333", "us-east-1")
    }

    fn three_stack_file() -> PlanFile {
        PlanFile {
            stacks: vec![
                entry("data", &[]),
                entry("compute", &["data"]),
                entry("api", &["compute"]),
            ],
            ..PlanFile::default()
        }
    }

    #[test]
    fn test_resolve_orders_stacks_topologically() {
        let plan = DeploymentPlan::resolve(&three_stack_file(), &context()).unwrap();
        let names: Vec<&str> = plan.stacks().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["data", "compute", "api"]);
        assert_eq!(plan.waves().len(), 3);
    }

    #[test]
    fn test_resolve_scopes_names_with_environment() {
        let context = RunContext::new("dev", "111122223333", "us-east-1");
        let mut file = three_stack_file();
        file.secrets.push(SecretBinding {
            source_stack: "api".to_string(),
            source_key: "ApiUrl".to_string(),
            target_secret_id: "shared/api-url".to_string(),
            transform: None,
        });

        let plan = DeploymentPlan::resolve(&file, &context).unwrap();
        assert_eq!(plan.stacks()[0].name, "data-dev");
        assert_eq!(plan.stacks()[1].depends_on, vec!["data-dev"]);
        assert_eq!(plan.bindings()[0].source_stack, "api-dev");
        assert_eq!(plan.bindings()[0].target_secret_id, "shared/api-url-dev");
    }

    #[test]
    fn test_empty_plan_rejected() {
        let result = DeploymentPlan::resolve(&PlanFile::default(), &context());
        assert!(matches!(result, Err(PlanError::NoStacks)));
    }

    #[test]
    fn test_cyclic_plan_rejected() {
        let file = PlanFile {
            stacks: vec![entry("a", &["b"]), entry("b", &["a"])],
            ..PlanFile::default()
        };
        let result = DeploymentPlan::resolve(&file, &context());
        assert!(matches!(result, Err(PlanError::DependencyCycle { .. })));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let file = PlanFile {
            stacks: vec![entry("api", &["ghost"])],
            ..PlanFile::default()
        };
        let result = DeploymentPlan::resolve(&file, &context());
        assert!(matches!(result, Err(PlanError::UnknownDependency { .. })));
    }

    #[test]
    fn test_binding_with_unknown_source_rejected() {
        let mut file = three_stack_file();
        file.secrets.push(SecretBinding {
            source_stack: "ghost".to_string(),
            source_key: "Url".to_string(),
            target_secret_id: "shared/url".to_string(),
            transform: None,
        });
        let result = DeploymentPlan::resolve(&file, &context());
        assert!(matches!(result, Err(PlanError::UnknownSourceStack { .. })));
    }

    #[test]
    fn test_digest_stable_across_json_key_order() {
        let a = PlanFile::from_json(
            r#"{"stacks": [{"name": "data", "depends_on": []}], "version": 1}"#,
        )
        .unwrap();
        let b = PlanFile::from_json(
            r#"{"version": 1, "stacks": [{"depends_on": [], "name": "data"}]}"#,
        )
        .unwrap();

        let plan_a = DeploymentPlan::resolve(&a, &context()).unwrap();
        let plan_b = DeploymentPlan::resolve(&b, &context()).unwrap();
        assert_eq!(plan_a.digest(), plan_b.digest());
    }

    #[test]
    fn test_digest_differs_per_environment() {
        let file = three_stack_file();
        let dev = DeploymentPlan::resolve(&file, &RunContext::new("dev", "1", "r")).unwrap();
        let prod = DeploymentPlan::resolve(&file, &RunContext::new("prod", "1", "r")).unwrap();
        assert_ne!(dev.digest(), prod.digest());
    }

    #[test]
    fn test_plan_file_parse_error_is_plan_error() {
        let result = PlanFile::from_json("{not json");
        assert!(matches!(result, Err(PlanError::Parse { .. })));
    }

    #[test]
    fn test_probe_specs_survive_resolution() {
        let mut file = three_stack_file();
        file.probes.push(ProbeSpec {
            name: "instances".to_string(),
            target: "https://api.example.com/instances".to_string(),
            expected_outcome: ExpectedOutcome::AuthRequired,
            timeout_ms: 5_000,
            payload: None,
        });

        let plan = DeploymentPlan::resolve(&file, &context()).unwrap();
        assert_eq!(plan.probes().len(), 1);
        assert_eq!(plan.probes()[0].name, "instances");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!StackStatus::Pending.is_terminal());
        assert!(!StackStatus::Deploying.is_terminal());
        assert!(StackStatus::Deployed.is_terminal());
        assert!(StackStatus::Failed.is_terminal());
        assert!(StackStatus::Skipped.is_terminal());
    }
}
