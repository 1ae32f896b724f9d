//! Ambient identity boundary for cross-account role assumption.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Short-lived credentials from a successful role assumption.
///
/// The trust validator only cares that assumption succeeded; the credential
/// fields are carried so standalone diagnostics can print the expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Assumes a cross-account role on behalf of the ambient caller identity.
///
/// Implementations never mutate infrastructure; a failed assumption is the
/// signal, not an error to repair.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Assume `role_arn` using `external_id`, under `session_name`.
    async fn assume_role(
        &self,
        role_arn: &str,
        external_id: &str,
        session_name: &str,
    ) -> ProviderResult<SessionCredentials>;
}
