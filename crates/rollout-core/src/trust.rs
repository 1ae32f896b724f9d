//! Cross-account trust verification.
//!
//! Before any cross-account operation runs, the validator proves the
//! described role can actually be assumed with the declared external id.
//! Verification is read-only: a short-lived session is requested and
//! discarded; nothing in the target account is touched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use rollout_providers::{IdentityProvider, ProviderError, ProviderErrorKind};

use crate::context::RunContext;
use crate::error::TrustError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Session name used for verification assumptions.
pub const VERIFY_SESSION_NAME: &str = "rollout-trust-verify";

/// A cross-account role plus external identifier that must be verifiable.
///
/// `verified` and `last_verified_at` are stamped only by the
/// [`TrustValidator`]; no other component mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRelationship {
    /// Account the role lives in.
    pub account_id: String,
    /// Role name within that account.
    pub role_name: String,
    /// External id the trust policy requires.
    pub external_id: String,
    /// Whether the last verification succeeded.
    #[serde(default)]
    pub verified: bool,
    /// When the relationship was last successfully verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl TrustRelationship {
    pub fn new(
        account_id: impl Into<String>,
        role_name: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            role_name: role_name.into(),
            external_id: external_id.into(),
            verified: false,
            last_verified_at: None,
        }
    }

    /// The full ARN of the described role.
    pub fn role_arn(&self) -> String {
        RunContext::role_arn(&self.account_id, &self.role_name)
    }

    /// Copy with the role name namespaced by the run's environment.
    pub fn scoped(&self, context: &RunContext) -> Self {
        Self {
            role_name: context.scoped_name(&self.role_name),
            ..self.clone()
        }
    }
}

/// Verifies trust relationships through an [`IdentityProvider`].
pub struct TrustValidator {
    identity: Arc<dyn IdentityProvider>,
    retry: RetryPolicy,
}

impl TrustValidator {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the bounded retry applied to transient assumption failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Verify one relationship.
    ///
    /// On success the returned copy has `verified = true` and a fresh
    /// `last_verified_at`. On failure the input is untouched and the error
    /// classifies whether retrying or out-of-band action is called for.
    pub async fn verify(&self, rel: &TrustRelationship) -> Result<TrustRelationship, TrustError> {
        let role_arn = rel.role_arn();

        retry_with_backoff(
            &self.retry,
            TrustError::is_transient,
            |_attempt| {
                let identity = Arc::clone(&self.identity);
                let role_arn = role_arn.clone();
                let external_id = rel.external_id.clone();
                async move {
                    identity
                        .assume_role(&role_arn, &external_id, VERIFY_SESSION_NAME)
                        .await
                        .map_err(|e| classify_assume_error(&role_arn, e))
                }
            },
        )
        .await?;

        info!(event = "trust.verified", role_arn = %role_arn);
        Ok(TrustRelationship {
            verified: true,
            last_verified_at: Some(Utc::now()),
            ..rel.clone()
        })
    }
}

/// Map a provider failure onto the trust taxonomy.
fn classify_assume_error(role_arn: &str, error: ProviderError) -> TrustError {
    match error.kind() {
        ProviderErrorKind::NotFound => TrustError::RoleNotFound {
            role_arn: role_arn.to_string(),
        },
        ProviderErrorKind::AccessDenied | ProviderErrorKind::AuthRejected => {
            TrustError::TrustPolicyMismatch {
                role_arn: role_arn.to_string(),
            }
        }
        _ => TrustError::Transient {
            role_arn: role_arn.to_string(),
            detail: error.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_providers::fakes::MemoryIdentityProvider;

    fn relationship() -> TrustRelationship {
        TrustRelationship::new("222233334444", "ops-observer", "ext-42")
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 1,
        }
    }

    #[test]
    fn test_role_arn_rendering() {
        assert_eq!(
            relationship().role_arn(),
            "arn:aws:iam::222233334444:role/ops-observer"
        );
    }

    #[test]
    fn test_scoped_suffixes_role_name() {
        let context = RunContext::new("staging", "111122223333", "us-east-1");
        let scoped = relationship().scoped(&context);
        assert_eq!(scoped.role_name, "ops-observer-staging");
        assert_eq!(scoped.account_id, "222233334444");
    }

    #[tokio::test]
    async fn test_verify_success_stamps_verified_and_timestamp() {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let rel = relationship();
        identity.allow(&rel.role_arn(), "ext-42");

        let validator = TrustValidator::new(identity);
        let verified = validator.verify(&rel).await.unwrap();
        assert!(verified.verified);
        assert!(verified.last_verified_at.is_some());
        // The input itself is never mutated.
        assert!(!rel.verified);
    }

    #[tokio::test]
    async fn test_verify_missing_role_is_role_not_found() {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let validator = TrustValidator::new(identity);

        let result = validator.verify(&relationship()).await;
        assert!(matches!(result, Err(TrustError::RoleNotFound { .. })));
    }

    #[tokio::test]
    async fn test_verify_policy_mismatch_keeps_unverified() {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let rel = relationship();
        identity.allow(&rel.role_arn(), "some-other-id");

        let validator = TrustValidator::new(identity);
        let result = validator.verify(&rel).await;
        assert!(matches!(result, Err(TrustError::TrustPolicyMismatch { .. })));
        assert!(!rel.verified);
    }

    #[tokio::test]
    async fn test_verify_retries_through_throttling() {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let rel = relationship();
        identity.allow(&rel.role_arn(), "ext-42");
        identity.throttle_next(&rel.role_arn(), 2);

        let validator = TrustValidator::new(identity.clone()).with_retry(fast_retry());
        let verified = validator.verify(&rel).await.unwrap();
        assert!(verified.verified);
        assert_eq!(identity.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_verify_transient_exhaustion_surfaces_transient() {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let rel = relationship();
        identity.allow(&rel.role_arn(), "ext-42");
        identity.throttle_next(&rel.role_arn(), 10);

        let validator = TrustValidator::new(identity).with_retry(fast_retry());
        let result = validator.verify(&rel).await;
        assert!(matches!(result, Err(TrustError::Transient { .. })));
    }
}
