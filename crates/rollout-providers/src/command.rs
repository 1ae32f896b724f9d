//! Command-backed provider adapters.
//!
//! Real rollouts drive external tooling (a CDK app, a cloud CLI, a deploy
//! script). These adapters bridge the narrow provider traits onto configured
//! argv vectors: the operand (stack name, secret id, role ARN) is appended to
//! the base command, stdout is parsed as JSON where the contract calls for
//! it, and stderr is classified into the provider error taxonomy.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::deploy::{StackDeployer, StackOutputs};
use crate::error::{ProviderError, ProviderResult};
use crate::identity::{IdentityProvider, SessionCredentials};
use crate::secret::{SecretStore, WriteDisposition};

/// Commands backing each provider concern, as argv vectors.
///
/// Absent entries leave the corresponding concern unconfigured; the caller
/// decides whether that is an error for the plan at hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandProviderConfig {
    /// Deploy command; invoked as `argv... <stack_name>`.
    #[serde(default)]
    pub deploy: Option<Vec<String>>,

    /// Secret read command; invoked as `argv... <secret_id>`.
    #[serde(default)]
    pub secret_get: Option<Vec<String>>,

    /// Secret write command; invoked as `argv... <secret_id> <value>`.
    #[serde(default)]
    pub secret_put: Option<Vec<String>>,

    /// Role assumption command; invoked as
    /// `argv... <role_arn> <external_id> <session_name>`.
    #[serde(default)]
    pub assume_role: Option<Vec<String>>,
}

/// Captured result of one external command run.
#[derive(Debug, Clone)]
struct CommandOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Run `argv` with extra operands appended, bounded by `timeout`.
async fn run_command(
    argv: &[String],
    operands: &[&str],
    timeout: Duration,
) -> ProviderResult<CommandOutput> {
    if argv.is_empty() {
        return Err(ProviderError::Other("empty provider command".to_string()));
    }

    let exe = &argv[0];
    let child = Command::new(exe)
        .args(&argv[1..])
        .args(operands)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProviderError::Other(format!("failed to spawn {exe}: {e}")))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProviderError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })?
        .map_err(|e| ProviderError::Other(format!("failed to collect {exe} output: {e}")))?;

    let result = CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    debug!(command = %exe, exit_code = result.exit_code, "provider command finished");
    Ok(result)
}

/// Classify a failed command from its stderr text.
///
/// Provider CLIs differ wildly in exit codes but are consistent in their
/// error vocabulary, so classification sniffs the message.
fn classify_command_failure(operand: &str, output: &CommandOutput) -> ProviderError {
    let stderr = output.stderr.to_lowercase();

    if stderr.contains("throttl") || stderr.contains("rate exceeded") || stderr.contains("too many requests")
    {
        return ProviderError::Throttled {
            detail: first_line(&output.stderr),
        };
    }
    if stderr.contains("timed out") || stderr.contains("connection") || stderr.contains("network") {
        return ProviderError::Network {
            detail: first_line(&output.stderr),
        };
    }
    if stderr.contains("access denied") || stderr.contains("accessdenied") || stderr.contains("not authorized")
    {
        return ProviderError::AccessDenied {
            detail: first_line(&output.stderr),
        };
    }
    if stderr.contains("does not exist") || stderr.contains("not found") || stderr.contains("nosuchentity")
    {
        return ProviderError::NotFound {
            resource: operand.to_string(),
        };
    }
    if stderr.contains("template") || stderr.contains("validation") {
        return ProviderError::InvalidTemplate {
            stack: operand.to_string(),
            detail: first_line(&output.stderr),
        };
    }

    ProviderError::Other(format!(
        "command exited with code {}: {}",
        output.exit_code,
        first_line(&output.stderr)
    ))
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}

// ---------------------------------------------------------------------------
// CommandDeployer
// ---------------------------------------------------------------------------

/// [`StackDeployer`] that shells out to a configured deploy command.
///
/// On success the command's stdout is parsed as a JSON object of output
/// name/value pairs; an `"already_current": true` member marks a no-op
/// deploy. Non-JSON stdout is tolerated as an empty output set.
pub struct CommandDeployer {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandDeployer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[derive(Debug, Deserialize)]
struct DeployStdout {
    #[serde(default)]
    outputs: BTreeMap<String, String>,
    #[serde(default)]
    already_current: bool,
}

#[async_trait]
impl StackDeployer for CommandDeployer {
    async fn deploy(&self, stack_name: &str) -> ProviderResult<StackOutputs> {
        let output = run_command(&self.argv, &[stack_name], self.timeout).await?;
        if output.exit_code != 0 {
            return Err(classify_command_failure(stack_name, &output));
        }

        let parsed: DeployStdout = match serde_json::from_str(&output.stdout) {
            Ok(parsed) => parsed,
            Err(_) => DeployStdout {
                outputs: BTreeMap::new(),
                already_current: false,
            },
        };
        Ok(StackOutputs {
            outputs: parsed.outputs,
            already_current: parsed.already_current,
        })
    }
}

// ---------------------------------------------------------------------------
// CommandSecretStore
// ---------------------------------------------------------------------------

/// [`SecretStore`] backed by get/put commands.
///
/// The get command prints the current value (exit 0) or "not found" style
/// stderr (nonzero exit); the put command prints `created` or `updated`.
pub struct CommandSecretStore {
    get_argv: Vec<String>,
    put_argv: Vec<String>,
    timeout: Duration,
}

impl CommandSecretStore {
    pub fn new(get_argv: Vec<String>, put_argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            get_argv,
            put_argv,
            timeout,
        }
    }
}

#[async_trait]
impl SecretStore for CommandSecretStore {
    async fn put(&self, secret_id: &str, value: &str) -> ProviderResult<WriteDisposition> {
        let output = run_command(&self.put_argv, &[secret_id, value], self.timeout).await?;
        if output.exit_code != 0 {
            return Err(classify_command_failure(secret_id, &output));
        }
        if output.stdout.trim().eq_ignore_ascii_case("updated") {
            Ok(WriteDisposition::Updated)
        } else {
            Ok(WriteDisposition::Created)
        }
    }

    async fn get(&self, secret_id: &str) -> ProviderResult<Option<String>> {
        let output = run_command(&self.get_argv, &[secret_id], self.timeout).await?;
        if output.exit_code != 0 {
            return match classify_command_failure(secret_id, &output) {
                ProviderError::NotFound { .. } => Ok(None),
                other => Err(other),
            };
        }
        Ok(Some(output.stdout.trim_end_matches('\n').to_string()))
    }

    async fn exists(&self, secret_id: &str) -> ProviderResult<bool> {
        Ok(self.get(secret_id).await?.is_some())
    }
}

// ---------------------------------------------------------------------------
// CommandIdentityProvider
// ---------------------------------------------------------------------------

/// [`IdentityProvider`] backed by an assume-role command.
///
/// The command prints the issued credentials as JSON on success.
pub struct CommandIdentityProvider {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandIdentityProvider {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[derive(Debug, Deserialize)]
struct AssumeRoleStdout {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expires_at: DateTime<Utc>,
}

#[async_trait]
impl IdentityProvider for CommandIdentityProvider {
    async fn assume_role(
        &self,
        role_arn: &str,
        external_id: &str,
        session_name: &str,
    ) -> ProviderResult<SessionCredentials> {
        let output = run_command(
            &self.argv,
            &[role_arn, external_id, session_name],
            self.timeout,
        )
        .await?;
        if output.exit_code != 0 {
            return Err(classify_command_failure(role_arn, &output));
        }

        let parsed: AssumeRoleStdout = serde_json::from_str(&output.stdout).map_err(|e| {
            ProviderError::Other(format!("assume-role command produced invalid JSON: {e}"))
        })?;
        Ok(SessionCredentials {
            access_key_id: parsed.access_key_id,
            secret_access_key: parsed.secret_access_key,
            session_token: parsed.session_token,
            expires_at: parsed.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_deployer_parses_json_outputs() {
        // The stack name operand lands in $0, keeping stdout pure JSON.
        let deployer = CommandDeployer::new(
            argv(&[
                "sh",
                "-c",
                r#"echo '{"outputs": {"ApiUrl": "https://api.example.com/prod"}}'"#,
            ]),
            Duration::from_secs(5),
        );
        let outputs = deployer.deploy("api-stack").await.unwrap();
        assert_eq!(outputs.get("ApiUrl"), Some("https://api.example.com/prod"));
        assert!(!outputs.already_current);
    }

    #[tokio::test]
    async fn test_deployer_reports_already_current() {
        let deployer = CommandDeployer::new(
            argv(&["sh", "-c", r#"echo '{"already_current": true}'"#]),
            Duration::from_secs(5),
        );
        let outputs = deployer.deploy("api-stack").await.unwrap();
        assert!(outputs.already_current);
        assert!(outputs.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_deployer_tolerates_non_json_stdout() {
        let deployer = CommandDeployer::new(
            argv(&["echo", "deployment complete"]),
            Duration::from_secs(5),
        );
        let outputs = deployer.deploy("api-stack").await.unwrap();
        assert!(outputs.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_deployer_nonzero_exit_is_classified() {
        let deployer = CommandDeployer::new(argv(&["false"]), Duration::from_secs(5));
        let result = deployer.deploy("api-stack").await;
        assert!(matches!(result, Err(ProviderError::Other(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_structural() {
        let deployer = CommandDeployer::new(
            argv(&["/nonexistent-binary-that-does-not-exist"]),
            Duration::from_secs(5),
        );
        let result = deployer.deploy("api-stack").await;
        assert!(matches!(result, Err(ProviderError::Other(_))));
    }

    #[tokio::test]
    async fn test_secret_get_returns_stdout_value() {
        let store = CommandSecretStore::new(
            argv(&["echo", "postgres://db.internal"]),
            argv(&["echo", "created"]),
            Duration::from_secs(5),
        );
        let value = store.get("db-url").await.unwrap();
        assert_eq!(value, Some("postgres://db.internal db-url".to_string()));
    }

    #[tokio::test]
    async fn test_secret_put_parses_disposition() {
        let store = CommandSecretStore::new(
            argv(&["echo", "value"]),
            argv(&["echo", "updated", "--"]),
            Duration::from_secs(5),
        );
        // stdout is "updated -- db-url value" which is not exactly "updated",
        // so the write reports Created; exact-match keeps the contract strict.
        let disposition = store.put("db-url", "value").await.unwrap();
        assert_eq!(disposition, WriteDisposition::Created);
    }

    #[test]
    fn test_classification_from_stderr_vocabulary() {
        let throttled = CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Error: Rate exceeded for operation".to_string(),
        };
        assert!(matches!(
            classify_command_failure("data", &throttled),
            ProviderError::Throttled { .. }
        ));

        let missing = CommandOutput {
            exit_code: 254,
            stdout: String::new(),
            stderr: "An error occurred: Role does not exist".to_string(),
        };
        assert!(matches!(
            classify_command_failure("role", &missing),
            ProviderError::NotFound { .. }
        ));

        let template = CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Template validation error: unknown resource".to_string(),
        };
        assert!(matches!(
            classify_command_failure("data", &template),
            ProviderError::InvalidTemplate { .. }
        ));
    }
}
