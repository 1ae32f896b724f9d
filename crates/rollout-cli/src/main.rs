//! Rollout - deployment orchestration CLI
//!
//! The `rollout` command drives a declared deployment plan end to end.
//!
//! ## Commands
//!
//! - `deploy`: run the full plan for an environment (deploys, secrets,
//!   trust verification, probes, report)
//! - `verify-trust`: verify one cross-account trust relationship standalone
//! - `probe`: run probe specs from a file for ad-hoc diagnostics
//!
//! ## Exit codes
//!
//! - `0`: success
//! - `1`: one or more stacks, probes, or trust checks failed
//! - `2`: invalid plan or parameters
//! - `3`: missing prerequisite (e.g. role or target not yet provisioned)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use rollout_core::{
    CancelSignal, DeploymentPlan, FailureCategory, Orchestrator, PlanFile, ProbeEngine,
    ProbeOutcome, ProbeResult, ProbeSpec, RetryPolicy, RunContext, RunOptions, TrustError,
    TrustRelationship, TrustValidator, DEFAULT_WAVE_CONCURRENCY, EXIT_FAILURE, EXIT_INVALID_PLAN,
    EXIT_MISSING_PREREQUISITE, EXIT_OK,
};
use rollout_providers::{
    CommandDeployer, CommandIdentityProvider, CommandSecretStore, HttpInvoker, ProviderErrorKind,
};

/// Deadline for one external provider command invocation.
const PROVIDER_COMMAND_TIMEOUT: Duration = Duration::from_secs(900);

#[derive(Parser)]
#[command(name = "rollout")]
#[command(author = "Rollout Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deployment orchestration for interdependent infrastructure stacks", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted logs and report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full deployment plan for an environment
    Deploy {
        /// Target environment name; namespaces stack/secret/role names
        #[arg(short, long, env = rollout_core::ENV_ENVIRONMENT)]
        environment: String,

        /// Path to the JSON plan file
        #[arg(short, long)]
        plan_file: PathBuf,

        /// Validate the plan and print the schedule without deploying
        #[arg(long)]
        dry_run: bool,

        /// Concurrent deploys allowed within one wave
        #[arg(long, default_value_t = DEFAULT_WAVE_CONCURRENCY)]
        concurrency: usize,

        /// Abort scheduling new work after this many seconds
        #[arg(long)]
        timeout_seconds: Option<u64>,

        /// Provider account id
        #[arg(long, env = rollout_core::ENV_ACCOUNT_ID, default_value = "")]
        account: String,

        /// Provider region
        #[arg(long, env = rollout_core::ENV_REGION, default_value = "")]
        region: String,
    },

    /// Verify a cross-account trust relationship standalone
    VerifyTrust {
        /// Account the role lives in
        #[arg(long)]
        account: String,

        /// Role name within that account
        #[arg(long)]
        role: String,

        /// External id the trust policy requires
        #[arg(long)]
        external_id: String,

        /// Assume-role command as a JSON argv array,
        /// e.g. '["./scripts/assume-role.sh"]'
        #[arg(long, env = "ROLLOUT_ASSUME_ROLE_COMMAND")]
        assume_role_command: Option<String>,
    },

    /// Run probe specs from a file for ad-hoc diagnostics
    Probe {
        /// Path to a JSON file holding an array of probe specs
        #[arg(long)]
        spec_file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rollout_core::init_tracing(cli.json, level);

    let json = cli.json;
    let code = match cli.command {
        Commands::Deploy {
            environment,
            plan_file,
            dry_run,
            concurrency,
            timeout_seconds,
            account,
            region,
        } => {
            cmd_deploy(
                &environment,
                &plan_file,
                dry_run,
                concurrency,
                timeout_seconds,
                &account,
                &region,
                json,
            )
            .await
        }
        Commands::VerifyTrust {
            account,
            role,
            external_id,
            assume_role_command,
        } => cmd_verify_trust(&account, &role, &external_id, assume_role_command.as_deref()).await,
        Commands::Probe { spec_file } => cmd_probe(&spec_file, json).await,
    };

    std::process::exit(code);
}

#[allow(clippy::too_many_arguments)]
async fn cmd_deploy(
    environment: &str,
    plan_path: &Path,
    dry_run: bool,
    concurrency: usize,
    timeout_seconds: Option<u64>,
    account: &str,
    region: &str,
    json: bool,
) -> i32 {
    let context = RunContext::new(environment, account, region);

    let file = match load_plan_file(plan_path) {
        Ok(file) => file,
        Err(error) => {
            eprintln!("invalid plan file: {error:#}");
            return EXIT_INVALID_PLAN;
        }
    };

    let plan = match DeploymentPlan::resolve(&file, &context) {
        Ok(plan) => plan,
        Err(error) => {
            eprintln!("invalid plan: {error}");
            eprintln!("hint: {}", FailureCategory::PlanInvalid.remediation_hint());
            return EXIT_INVALID_PLAN;
        }
    };

    info!(
        environment = %plan.environment(),
        plan = %plan.digest().short(),
        stacks = plan.stack_count(),
        "plan resolved"
    );

    if dry_run {
        print_schedule(&plan);
        return EXIT_OK;
    }

    let deploy_argv = match &file.providers.deploy {
        Some(argv) => argv.clone(),
        None => {
            eprintln!("plan file does not configure a deploy command (providers.deploy)");
            return EXIT_INVALID_PLAN;
        }
    };
    if !plan.bindings().is_empty()
        && (file.providers.secret_get.is_none() || file.providers.secret_put.is_none())
    {
        eprintln!(
            "plan declares secret bindings but no secret commands (providers.secret_get/secret_put)"
        );
        return EXIT_INVALID_PLAN;
    }
    if !plan.trust_relationships().is_empty() && file.providers.assume_role.is_none() {
        eprintln!(
            "plan declares trust relationships but no assume-role command (providers.assume_role)"
        );
        return EXIT_INVALID_PLAN;
    }

    let deployer = Arc::new(CommandDeployer::new(deploy_argv, PROVIDER_COMMAND_TIMEOUT));
    let secrets = Arc::new(CommandSecretStore::new(
        file.providers.secret_get.clone().unwrap_or_default(),
        file.providers.secret_put.clone().unwrap_or_default(),
        PROVIDER_COMMAND_TIMEOUT,
    ));
    let identity = Arc::new(CommandIdentityProvider::new(
        file.providers.assume_role.clone().unwrap_or_default(),
        PROVIDER_COMMAND_TIMEOUT,
    ));
    let invoker = Arc::new(HttpInvoker::new());

    let options = RunOptions {
        concurrency,
        retry: RetryPolicy::default(),
        deadline: timeout_seconds.map(Duration::from_secs),
        cancel: CancelSignal::new(),
    };

    let orchestrator = Orchestrator::new(deployer, secrets, identity, invoker);
    let report = orchestrator.run(&plan, options).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report.render_json()).unwrap_or_default()
        );
    } else {
        print!("{}", report.render_text());
    }

    report.exit_code()
}

async fn cmd_verify_trust(
    account: &str,
    role: &str,
    external_id: &str,
    assume_role_command: Option<&str>,
) -> i32 {
    let argv = match parse_command_argv(assume_role_command) {
        Ok(argv) => argv,
        Err(error) => {
            eprintln!("{error:#}");
            return EXIT_INVALID_PLAN;
        }
    };

    let identity = Arc::new(CommandIdentityProvider::new(argv, PROVIDER_COMMAND_TIMEOUT));
    let validator = TrustValidator::new(identity);
    let relationship = TrustRelationship::new(account, role, external_id);

    let result = validator.verify(&relationship).await;
    match &result {
        Ok(verified) => {
            println!(
                "verified {} (external id accepted) at {}",
                verified.role_arn(),
                verified
                    .last_verified_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            );
        }
        Err(error) => {
            eprintln!("verification failed: {error}");
            eprintln!("hint: {}", FailureCategory::from(error).remediation_hint());
        }
    }
    trust_exit_code(&result)
}

async fn cmd_probe(spec_path: &Path, json: bool) -> i32 {
    let specs = match load_probe_specs(spec_path) {
        Ok(specs) => specs,
        Err(error) => {
            eprintln!("invalid probe spec file: {error:#}");
            return EXIT_INVALID_PLAN;
        }
    };

    let engine = ProbeEngine::new(Arc::new(HttpInvoker::new()));
    let results = engine.run_all(&specs).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).unwrap_or_default()
        );
    } else {
        for result in &results {
            println!(
                "{} [{:?}] {}ms {}",
                result.spec.name, result.outcome, result.latency_ms, result.detail
            );
        }
    }

    probe_exit_code(&results)
}

fn load_plan_file(path: &Path) -> Result<PlanFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(PlanFile::from_json(&text)?)
}

fn load_probe_specs(path: &Path) -> Result<Vec<ProbeSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of probe specs", path.display()))
}

fn parse_command_argv(raw: Option<&str>) -> Result<Vec<String>> {
    let raw = raw.context(
        "no assume-role command configured; pass --assume-role-command or set ROLLOUT_ASSUME_ROLE_COMMAND",
    )?;
    let argv: Vec<String> =
        serde_json::from_str(raw).context("assume-role command must be a JSON argv array")?;
    anyhow::ensure!(!argv.is_empty(), "assume-role command must not be empty");
    Ok(argv)
}

/// Print the computed schedule without touching any provider.
fn print_schedule(plan: &DeploymentPlan) {
    println!(
        "plan {} environment={} ({} stacks)",
        plan.digest().short(),
        plan.environment(),
        plan.stack_count()
    );
    for (index, wave) in plan.waves().iter().enumerate() {
        println!("  wave {}: {}", index, wave.join(", "));
    }
    for binding in plan.bindings() {
        println!(
            "  secret {} <- {}:{}",
            binding.target_secret_id, binding.source_stack, binding.source_key
        );
    }
    for relationship in plan.trust_relationships() {
        println!("  trust {}", relationship.role_arn());
    }
    for probe in plan.probes() {
        println!("  probe {} -> {}", probe.name, probe.target);
    }
}

/// Exit code for a standalone trust verification.
fn trust_exit_code(result: &std::result::Result<TrustRelationship, TrustError>) -> i32 {
    match result {
        Ok(_) => EXIT_OK,
        Err(TrustError::RoleNotFound { .. }) => EXIT_MISSING_PREREQUISITE,
        Err(_) => EXIT_FAILURE,
    }
}

/// Exit code for a standalone probe batch.
///
/// Failures that are all "target does not exist" indicate the upstream
/// stack is missing rather than unhealthy.
fn probe_exit_code(results: &[ProbeResult]) -> i32 {
    let failures: Vec<&ProbeResult> = results
        .iter()
        .filter(|r| r.outcome == ProbeOutcome::Fail)
        .collect();
    if failures.is_empty() {
        EXIT_OK
    } else if failures
        .iter()
        .all(|r| r.failure_kind == Some(ProviderErrorKind::NotFound))
    {
        EXIT_MISSING_PREREQUISITE
    } else {
        EXIT_FAILURE
    }
}
