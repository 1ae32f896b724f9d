//! Wave-ordered deployment orchestration.
//!
//! The orchestrator walks a resolved [`DeploymentPlan`] wave by wave:
//! stacks within a wave deploy concurrently under a bounded worker pool,
//! waves themselves are strictly sequential. A failed stack takes its
//! transitive dependents out of the run as `Skipped` while independent
//! branches keep deploying. After every reachable stack resolves, secret
//! bindings, trust verification, and probes run, and everything folds into
//! one [`RunReport`].
//!
//! The orchestrator performs no cloud mutations itself; everything goes
//! through the injected provider traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use rollout_providers::{
    EndpointInvoker, IdentityProvider, SecretStore, StackDeployer, StackOutputs,
};

use crate::error::{DeployError, FailureCategory, ProvisionError};
use crate::obs;
use crate::plan::{DeploymentPlan, StackStatus};
use crate::probe::{ProbeEngine, ProbeOutcome, ProbeResult};
use crate::report::{RunOutcome, RunReport, SecretReport, StackReport, TrustReport};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::secrets::SecretProvisioner;
use crate::trust::TrustValidator;

/// Default cap on concurrent deploys within one wave.
pub const DEFAULT_WAVE_CONCURRENCY: usize = 4;

/// Cooperative run-level cancellation signal.
///
/// Cancelling stops the scheduling of new work immediately; tasks already
/// in flight finish their current attempt (not their full retry budget).
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one orchestration run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Concurrent deploys allowed within a wave.
    pub concurrency: usize,
    /// Retry policy for transient deploy/provision failures.
    pub retry: RetryPolicy,
    /// Run-level deadline; past it, no new work is scheduled.
    pub deadline: Option<Duration>,
    /// External abort signal.
    pub cancel: CancelSignal,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WAVE_CONCURRENCY,
            retry: RetryPolicy::default(),
            deadline: None,
            cancel: CancelSignal::new(),
        }
    }
}

/// Scheduling gate combining the abort signal and the run deadline.
#[derive(Clone)]
struct RunGate {
    cancel: CancelSignal,
    deadline: Option<Instant>,
}

impl RunGate {
    fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }
}

/// Result of one stack's deploy task.
struct DeployTaskResult {
    stack: String,
    attempts: u32,
    outcome: Result<StackOutputs, DeployError>,
    /// The gate closed before the first attempt; the stack was never deployed.
    skipped_for_cancel: bool,
}

/// Drives a [`DeploymentPlan`] through the provider boundary.
pub struct Orchestrator {
    deployer: Arc<dyn StackDeployer>,
    secrets: Arc<dyn SecretStore>,
    identity: Arc<dyn IdentityProvider>,
    invoker: Arc<dyn EndpointInvoker>,
}

impl Orchestrator {
    pub fn new(
        deployer: Arc<dyn StackDeployer>,
        secrets: Arc<dyn SecretStore>,
        identity: Arc<dyn IdentityProvider>,
        invoker: Arc<dyn EndpointInvoker>,
    ) -> Self {
        Self {
            deployer,
            secrets,
            identity,
            invoker,
        }
    }

    /// Execute the plan and aggregate a [`RunReport`].
    ///
    /// Stack statuses are owned exclusively by this call: tasks report back
    /// and the scheduler applies every transition, so no two tasks ever
    /// touch the same stack's state.
    pub async fn run(&self, plan: &DeploymentPlan, options: RunOptions) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let _span = obs::RunSpan::enter(&run_id);
        let started_at = Utc::now();
        let started = Instant::now();
        obs::emit_run_started(&run_id, plan.environment(), plan.stack_count());

        let gate = RunGate {
            cancel: options.cancel.clone(),
            deadline: options.deadline.map(|d| Instant::now() + d),
        };

        let mut statuses: HashMap<String, StackStatus> = plan
            .stacks()
            .iter()
            .map(|s| (s.name.clone(), StackStatus::Pending))
            .collect();
        let mut details: HashMap<String, StackDetail> = HashMap::new();
        let mut outputs: HashMap<String, StackOutputs> = HashMap::new();
        let mut cancelled = false;

        for (wave_index, wave) in plan.waves().iter().enumerate() {
            if gate.is_closed() {
                cancelled = true;
                break;
            }

            // Stacks whose dependencies all deployed; anything downstream of
            // a failure was already marked Skipped.
            let eligible: Vec<String> = wave
                .iter()
                .filter(|name| statuses[name.as_str()] == StackStatus::Pending)
                .cloned()
                .collect();
            if eligible.is_empty() {
                continue;
            }

            obs::emit_wave_started(&run_id, wave_index, eligible.len());
            let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
            let mut handles: Vec<(String, JoinHandle<DeployTaskResult>)> = Vec::new();

            for name in eligible {
                *statuses
                    .get_mut(&name)
                    .expect("eligible stack is registered") = StackStatus::Deploying;
                handles.push((
                    name.clone(),
                    self.spawn_deploy_task(
                        name,
                        run_id.clone(),
                        Arc::clone(&semaphore),
                        gate.clone(),
                        options.retry.clone(),
                    ),
                ));
            }

            // Waves are barriers: every sibling reaches a terminal state (or
            // is returned to Pending by cancellation) before the next wave.
            for (name, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join_error) => {
                        let error = DeployError::Structural {
                            stack: name.clone(),
                            detail: format!("deploy task aborted: {join_error}"),
                        };
                        DeployTaskResult {
                            stack: name,
                            attempts: 0,
                            outcome: Err(error),
                            skipped_for_cancel: false,
                        }
                    }
                };
                self.apply_deploy_result(
                    &run_id,
                    plan,
                    result,
                    &mut statuses,
                    &mut details,
                    &mut outputs,
                    &mut cancelled,
                );
            }
        }

        if cancelled {
            let pending = statuses
                .values()
                .filter(|s| **s == StackStatus::Pending)
                .count();
            obs::emit_run_cancelled(&run_id, pending);
        }

        let secret_reports = self
            .provision_secrets(plan, &statuses, &outputs, &options.retry, cancelled)
            .await;
        let trust_reports = self.verify_trust(plan, &options.retry, cancelled).await;
        let probe_results: Vec<ProbeResult> = if cancelled {
            Vec::new()
        } else {
            ProbeEngine::new(Arc::clone(&self.invoker))
                .run_all(plan.probes())
                .await
        };

        let stacks: Vec<StackReport> = plan
            .stacks()
            .iter()
            .map(|descriptor| {
                let detail = details.remove(&descriptor.name).unwrap_or_default();
                StackReport {
                    name: descriptor.name.clone(),
                    status: statuses[&descriptor.name],
                    attempts: detail.attempts,
                    unchanged: detail.unchanged,
                    detail: detail.detail,
                    category: detail.category,
                }
            })
            .collect();

        let all_deployed = stacks.iter().all(|s| s.status == StackStatus::Deployed);
        let trust_ok = trust_reports.iter().all(|t| t.relationship.verified);
        let probes_ok = probe_results.iter().all(|p| p.outcome != ProbeOutcome::Fail);
        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else if all_deployed && trust_ok && probes_ok {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        };

        let report = RunReport {
            run_id: run_id.clone(),
            environment: plan.environment().to_string(),
            plan_digest: plan.digest().as_str().to_string(),
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
            stacks,
            secrets: secret_reports,
            trust: trust_reports,
            probes: probe_results,
        };

        obs::emit_run_finished(&run_id, report.duration_ms, report.exit_code(), cancelled);
        report
    }

    fn spawn_deploy_task(
        &self,
        stack: String,
        run_id: String,
        semaphore: Arc<Semaphore>,
        gate: RunGate,
        retry: RetryPolicy,
    ) -> JoinHandle<DeployTaskResult> {
        let deployer = Arc::clone(&self.deployer);
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("wave semaphore is never closed");

            if gate.is_closed() {
                return DeployTaskResult {
                    stack,
                    attempts: 0,
                    outcome: Ok(StackOutputs::new()),
                    skipped_for_cancel: true,
                };
            }

            let mut attempts = 0u32;
            let outcome = retry_with_backoff(
                &retry,
                // Cancellation caps the retry budget: a transient error is
                // only retried while the gate stays open.
                |error: &DeployError| error.is_transient() && !gate.is_closed(),
                |attempt| {
                    attempts = attempt;
                    obs::emit_stack_deploying(&run_id, &stack, attempt);
                    let deployer = Arc::clone(&deployer);
                    let stack = stack.clone();
                    async move {
                        deployer
                            .deploy(&stack)
                            .await
                            .map_err(|e| DeployError::from_provider(&stack, e))
                    }
                },
            )
            .await;

            DeployTaskResult {
                stack,
                attempts,
                outcome,
                skipped_for_cancel: false,
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_deploy_result(
        &self,
        run_id: &str,
        plan: &DeploymentPlan,
        result: DeployTaskResult,
        statuses: &mut HashMap<String, StackStatus>,
        details: &mut HashMap<String, StackDetail>,
        outputs: &mut HashMap<String, StackOutputs>,
        cancelled: &mut bool,
    ) {
        let stack = result.stack;

        if result.skipped_for_cancel {
            *cancelled = true;
            *statuses.get_mut(&stack).expect("stack is registered") = StackStatus::Pending;
            return;
        }

        match result.outcome {
            Ok(stack_outputs) => {
                *statuses.get_mut(&stack).expect("stack is registered") = StackStatus::Deployed;
                obs::emit_stack_deployed(
                    run_id,
                    &stack,
                    result.attempts,
                    stack_outputs.already_current,
                );
                details.insert(
                    stack.clone(),
                    StackDetail {
                        attempts: result.attempts,
                        unchanged: stack_outputs.already_current,
                        detail: None,
                        category: None,
                    },
                );
                outputs.insert(stack, stack_outputs);
            }
            Err(error) => {
                *statuses.get_mut(&stack).expect("stack is registered") = StackStatus::Failed;
                obs::emit_stack_failed(run_id, &stack, &error);
                details.insert(
                    stack.clone(),
                    StackDetail {
                        attempts: result.attempts,
                        unchanged: false,
                        detail: Some(error.to_string()),
                        category: Some(FailureCategory::from(&error)),
                    },
                );

                for dependent in plan.transitive_dependents_of(&stack) {
                    let status = statuses
                        .get_mut(&dependent)
                        .expect("dependent is a registered stack");
                    if *status == StackStatus::Pending {
                        *status = StackStatus::Skipped;
                        obs::emit_stack_skipped(run_id, &dependent, &stack);
                        details.insert(
                            dependent.clone(),
                            StackDetail {
                                attempts: 0,
                                unchanged: false,
                                detail: Some(format!("upstream stack {stack} failed")),
                                category: None,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Execute secret bindings for every deployed source stack.
    async fn provision_secrets(
        &self,
        plan: &DeploymentPlan,
        statuses: &HashMap<String, StackStatus>,
        outputs: &HashMap<String, StackOutputs>,
        retry: &RetryPolicy,
        cancelled: bool,
    ) -> Vec<SecretReport> {
        let provisioner = SecretProvisioner::new(Arc::clone(&self.secrets));
        let mut reports = Vec::with_capacity(plan.bindings().len());

        for binding in plan.bindings() {
            if cancelled {
                reports.push(SecretReport {
                    target_secret_id: binding.target_secret_id.clone(),
                    source_stack: binding.source_stack.clone(),
                    outcome: None,
                    detail: Some("not run: rollout was cancelled".to_string()),
                    category: None,
                });
                continue;
            }

            if statuses.get(&binding.source_stack) != Some(&StackStatus::Deployed) {
                reports.push(SecretReport {
                    target_secret_id: binding.target_secret_id.clone(),
                    source_stack: binding.source_stack.clone(),
                    outcome: None,
                    detail: Some(format!(
                        "not run: source stack {} was not deployed",
                        binding.source_stack
                    )),
                    category: None,
                });
                continue;
            }

            let source_outputs = outputs
                .get(&binding.source_stack)
                .cloned()
                .unwrap_or_default();
            let result = retry_with_backoff(retry, ProvisionError::is_transient, |_attempt| {
                let provisioner = &provisioner;
                let source_outputs = &source_outputs;
                async move { provisioner.provision(binding, source_outputs).await }
            })
            .await;

            reports.push(match result {
                Ok(outcome) => SecretReport {
                    target_secret_id: binding.target_secret_id.clone(),
                    source_stack: binding.source_stack.clone(),
                    outcome: Some(outcome),
                    detail: None,
                    category: None,
                },
                Err(error) => SecretReport {
                    target_secret_id: binding.target_secret_id.clone(),
                    source_stack: binding.source_stack.clone(),
                    outcome: None,
                    detail: Some(error.to_string()),
                    category: Some(FailureCategory::from(&error)),
                },
            });
        }

        reports
    }

    /// Verify every declared trust relationship.
    async fn verify_trust(
        &self,
        plan: &DeploymentPlan,
        retry: &RetryPolicy,
        cancelled: bool,
    ) -> Vec<TrustReport> {
        let validator = TrustValidator::new(Arc::clone(&self.identity)).with_retry(retry.clone());
        let mut reports = Vec::with_capacity(plan.trust_relationships().len());

        for relationship in plan.trust_relationships() {
            if cancelled {
                reports.push(TrustReport {
                    relationship: relationship.clone(),
                    detail: Some("not run: rollout was cancelled".to_string()),
                    category: None,
                });
                continue;
            }

            reports.push(match validator.verify(relationship).await {
                Ok(verified) => TrustReport {
                    relationship: verified,
                    detail: None,
                    category: None,
                },
                Err(error) => TrustReport {
                    relationship: relationship.clone(),
                    detail: Some(error.to_string()),
                    category: Some(FailureCategory::from(&error)),
                },
            });
        }

        reports
    }
}

/// Per-stack report fields accumulated during the run.
#[derive(Debug, Default)]
struct StackDetail {
    attempts: u32,
    unchanged: bool,
    detail: Option<String>,
    category: Option<FailureCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_signal_latches() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        signal.cancel();
        assert!(signal.is_cancelled());

        let clone = signal.clone();
        assert!(clone.is_cancelled(), "clones share the signal");
    }

    #[test]
    fn test_default_options() {
        let options = RunOptions::default();
        assert_eq!(options.concurrency, DEFAULT_WAVE_CONCURRENCY);
        assert!(options.deadline.is_none());
        assert!(!options.cancel.is_cancelled());
    }

    #[test]
    fn test_gate_closes_on_cancel_or_deadline() {
        let gate = RunGate {
            cancel: CancelSignal::new(),
            deadline: None,
        };
        assert!(!gate.is_closed());

        gate.cancel.cancel();
        assert!(gate.is_closed());

        let expired = RunGate {
            cancel: CancelSignal::new(),
            deadline: Some(Instant::now() - Duration::from_secs(1)),
        };
        assert!(expired.is_closed());
    }
}
