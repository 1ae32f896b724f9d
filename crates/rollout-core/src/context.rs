//! Immutable per-run context.
//!
//! Replaces ambient, mutable shell-session state (account ids, regions,
//! environment suffixes) with one explicit value passed into every
//! component call.

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Environment variable naming the target environment (e.g. `dev`, `prod`).
pub const ENV_ENVIRONMENT: &str = "ROLLOUT_ENVIRONMENT";
/// Environment variable naming the provider account id.
pub const ENV_ACCOUNT_ID: &str = "ROLLOUT_ACCOUNT_ID";
/// Environment variable naming the provider region.
pub const ENV_REGION: &str = "ROLLOUT_REGION";

/// Identity and namespacing for one orchestration run.
///
/// Immutable once constructed. The `environment` name suffixes every stack,
/// secret, and role name so parallel environments never collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Environment name used as a namespace suffix. Empty applies no suffix.
    pub environment: String,
    /// Account the rollout targets.
    pub account_id: String,
    /// Region the rollout targets.
    pub region: String,
}

impl RunContext {
    pub fn new(
        environment: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            account_id: account_id.into(),
            region: region.into(),
        }
    }

    /// Build a context from `ROLLOUT_*` environment variables.
    pub fn from_env() -> Result<Self, ContextError> {
        Ok(Self {
            environment: require_env(ENV_ENVIRONMENT)?,
            account_id: require_env(ENV_ACCOUNT_ID)?,
            region: require_env(ENV_REGION)?,
        })
    }

    /// Namespace a stack/secret/role name with the environment suffix.
    pub fn scoped_name(&self, base: &str) -> String {
        if self.environment.is_empty() {
            base.to_string()
        } else {
            format!("{}-{}", base, self.environment)
        }
    }

    /// Render a role ARN in `account_id` for `role_name`.
    pub fn role_arn(account_id: &str, role_name: &str) -> String {
        format!("arn:aws:iam::{account_id}:role/{role_name}")
    }
}

fn require_env(name: &str) -> Result<String, ContextError> {
    std::env::var(name).map_err(|_| ContextError::MissingEnvVar {
        name: name.to_string(),
    })
}
