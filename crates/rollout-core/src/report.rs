//! Run report aggregation and rendering.
//!
//! The report always lists every stack's terminal status, every probe's
//! outcome, and every trust relationship's verification state, even on
//! partial failure, so the operator can see exactly how far the rollout
//! progressed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureCategory;
use crate::plan::StackStatus;
use crate::probe::{ProbeOutcome, ProbeResult};
use crate::secrets::ProvisionOutcome;
use crate::trust::TrustRelationship;

/// Process exit code for a fully successful run.
pub const EXIT_OK: i32 = 0;
/// One or more stacks, probes, or trust checks failed.
pub const EXIT_FAILURE: i32 = 1;
/// The plan or parameters were invalid; nothing was attempted.
pub const EXIT_INVALID_PLAN: i32 = 2;
/// A prerequisite is missing (e.g. an upstream stack or role not yet provisioned).
pub const EXIT_MISSING_PREREQUISITE: i32 = 3;

/// Overall disposition of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    /// The run was aborted by a cancellation signal or deadline; in-flight
    /// work finished, the rest was never scheduled.
    Cancelled,
}

/// Terminal state of one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackReport {
    pub name: String,
    pub status: StackStatus,
    /// Deploy attempts consumed (0 when never scheduled).
    pub attempts: u32,
    /// The provider reported the stack was already up to date.
    pub unchanged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
}

/// Result of one secret binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretReport {
    pub target_secret_id: String,
    pub source_stack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProvisionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
}

impl SecretReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Result of one trust relationship verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustReport {
    pub relationship: TrustRelationship,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
}

/// Aggregated outcome of one orchestration run.
///
/// Owned by the execution that produced it; rendered once and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub environment: String,
    pub plan_digest: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
    pub stacks: Vec<StackReport>,
    pub secrets: Vec<SecretReport>,
    pub trust: Vec<TrustReport>,
    pub probes: Vec<ProbeResult>,
}

impl RunReport {
    /// Whether every stack deployed, every trust check verified, and no
    /// probe failed. Warnings do not count against success.
    pub fn passed(&self) -> bool {
        self.outcome != RunOutcome::Cancelled
            && self.stacks.iter().all(|s| s.status == StackStatus::Deployed)
            && self.trust.iter().all(|t| t.relationship.verified)
            && self.probes.iter().all(|p| p.outcome != ProbeOutcome::Fail)
    }

    /// Process exit code per the CLI contract.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            EXIT_OK
        } else {
            EXIT_FAILURE
        }
    }

    pub fn deployed_count(&self) -> usize {
        self.count_status(StackStatus::Deployed)
    }

    pub fn failed_count(&self) -> usize {
        self.count_status(StackStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count_status(StackStatus::Skipped)
    }

    fn count_status(&self, status: StackStatus) -> usize {
        self.stacks.iter().filter(|s| s.status == status).count()
    }

    /// Distinct failure categories present in the report, with their
    /// remediation hints, in first-appearance order.
    pub fn remediation_hints(&self) -> Vec<(FailureCategory, &'static str)> {
        let mut seen = Vec::new();
        let categories = self
            .stacks
            .iter()
            .filter_map(|s| s.category)
            .chain(self.secrets.iter().filter_map(|s| s.category))
            .chain(self.trust.iter().filter_map(|t| t.category))
            .chain(self.probes.iter().filter_map(|p| match p.outcome {
                ProbeOutcome::Fail => Some(FailureCategory::ProbeFail),
                ProbeOutcome::Warn => Some(FailureCategory::ProbeWarn),
                ProbeOutcome::Pass => None,
            }));

        for category in categories {
            if !seen.contains(&category) {
                seen.push(category);
            }
        }
        seen.into_iter()
            .map(|c| (c, c.remediation_hint()))
            .collect()
    }

    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let outcome = match self.outcome {
            RunOutcome::Succeeded => "SUCCEEDED",
            RunOutcome::Failed => "FAILED",
            RunOutcome::Cancelled => "CANCELLED",
        };
        out.push_str(&format!(
            "run {} [{}] environment={} plan={}\n",
            self.run_id,
            outcome,
            self.environment,
            &self.plan_digest[..12.min(self.plan_digest.len())],
        ));
        out.push_str(&format!(
            "stacks: {} deployed, {} failed, {} skipped ({} total, {}ms)\n",
            self.deployed_count(),
            self.failed_count(),
            self.skipped_count(),
            self.stacks.len(),
            self.duration_ms,
        ));

        for stack in &self.stacks {
            let marker = match stack.status {
                StackStatus::Deployed if stack.unchanged => "= ",
                StackStatus::Deployed => "+ ",
                StackStatus::Failed => "x ",
                StackStatus::Skipped => "- ",
                StackStatus::Pending | StackStatus::Deploying => "? ",
            };
            out.push_str(&format!("  {}{} [{:?}]", marker, stack.name, stack.status));
            if let Some(detail) = &stack.detail {
                out.push_str(&format!(" {detail}"));
            }
            out.push('\n');
        }

        if !self.secrets.is_empty() {
            out.push_str("secrets:\n");
            for secret in &self.secrets {
                match (&secret.outcome, &secret.detail) {
                    (Some(outcome), _) => out.push_str(&format!(
                        "  {} <- {} [{:?}]\n",
                        secret.target_secret_id, secret.source_stack, outcome
                    )),
                    (None, Some(detail)) => out.push_str(&format!(
                        "  {} <- {} [failed] {}\n",
                        secret.target_secret_id, secret.source_stack, detail
                    )),
                    (None, None) => out.push_str(&format!(
                        "  {} <- {} [not run]\n",
                        secret.target_secret_id, secret.source_stack
                    )),
                }
            }
        }

        if !self.trust.is_empty() {
            out.push_str("trust:\n");
            for trust in &self.trust {
                let state = if trust.relationship.verified {
                    "verified"
                } else {
                    "unverified"
                };
                out.push_str(&format!(
                    "  {} [{}]",
                    trust.relationship.role_arn(),
                    state
                ));
                if let Some(detail) = &trust.detail {
                    out.push_str(&format!(" {detail}"));
                }
                out.push('\n');
            }
        }

        if !self.probes.is_empty() {
            out.push_str("probes:\n");
            for probe in &self.probes {
                out.push_str(&format!(
                    "  {} [{:?}] {}ms {}\n",
                    probe.spec.name, probe.outcome, probe.latency_ms, probe.detail
                ));
            }
        }

        let hints = self.remediation_hints();
        if !hints.is_empty() {
            out.push_str("remediation:\n");
            for (category, hint) in hints {
                out.push_str(&format!("  [{category:?}] {hint}\n"));
            }
        }

        out
    }

    /// Machine-readable rendering.
    pub fn render_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
