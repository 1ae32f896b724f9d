//! Secret binding execution.
//!
//! A [`SecretBinding`] copies one output value of a deployed stack into the
//! shared secret store consumed by another stack. The value comes from the
//! deploy operation's own result, never from a separate metadata query, so
//! provisioning cannot race the provider's eventual consistency.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use rollout_providers::{SecretStore, StackOutputs, WriteDisposition};

use crate::error::ProvisionError;

/// Declarative rule copying a stack output into a shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBinding {
    /// Stack whose deploy result supplies the value.
    pub source_stack: String,
    /// Output name to read from the source stack.
    pub source_key: String,
    /// Secret id to write.
    pub target_secret_id: String,
    /// Optional pure transform applied before writing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<SecretTransform>,
}

/// Pure value transforms applied between read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretTransform {
    /// Strip the path component from a URL, keeping scheme and authority.
    StripPathSuffix,
    /// Remove trailing slashes.
    TrimTrailingSlash,
}

impl SecretTransform {
    /// Apply this transform. Pure: same input, same output, no side effects.
    pub fn apply(&self, value: &str) -> String {
        match self {
            SecretTransform::StripPathSuffix => {
                let authority_start = value.find("://").map(|i| i + 3).unwrap_or(0);
                match value[authority_start..].find('/') {
                    Some(slash) => value[..authority_start + slash].to_string(),
                    None => value.to_string(),
                }
            }
            SecretTransform::TrimTrailingSlash => value.trim_end_matches('/').to_string(),
        }
    }
}

/// What a provisioning call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The secret did not exist and was created.
    Created,
    /// The secret held a different value and was overwritten.
    Updated,
    /// The secret already held this value; nothing was written.
    Unchanged,
}

/// Executes secret bindings against a [`SecretStore`].
pub struct SecretProvisioner {
    store: Arc<dyn SecretStore>,
}

impl SecretProvisioner {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Provision one binding from the live outputs of its source stack.
    ///
    /// Idempotent: when the store already holds the (transformed) value,
    /// no write is issued and the call reports `Unchanged`.
    pub async fn provision(
        &self,
        binding: &SecretBinding,
        source_outputs: &StackOutputs,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let raw = source_outputs.get(&binding.source_key).ok_or_else(|| {
            ProvisionError::SourceValueMissing {
                stack: binding.source_stack.clone(),
                key: binding.source_key.clone(),
            }
        })?;

        let value = match binding.transform {
            Some(transform) => transform.apply(raw),
            None => raw.to_string(),
        };

        let current = self
            .store
            .get(&binding.target_secret_id)
            .await
            .map_err(|e| ProvisionError::StoreUnavailable {
                secret_id: binding.target_secret_id.clone(),
                detail: e.to_string(),
            })?;

        if current.as_deref() == Some(value.as_str()) {
            info!(
                event = "secret.unchanged",
                secret_id = %binding.target_secret_id,
                source_stack = %binding.source_stack,
            );
            return Ok(ProvisionOutcome::Unchanged);
        }

        let disposition = self
            .store
            .put(&binding.target_secret_id, &value)
            .await
            .map_err(|e| ProvisionError::StoreUnavailable {
                secret_id: binding.target_secret_id.clone(),
                detail: e.to_string(),
            })?;

        info!(
            event = "secret.provisioned",
            secret_id = %binding.target_secret_id,
            source_stack = %binding.source_stack,
            disposition = ?disposition,
        );

        Ok(match disposition {
            WriteDisposition::Created => ProvisionOutcome::Created,
            WriteDisposition::Updated => ProvisionOutcome::Updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_providers::fakes::MemorySecretStore;

    fn binding(transform: Option<SecretTransform>) -> SecretBinding {
        SecretBinding {
            source_stack: "api".to_string(),
            source_key: "ApiUrl".to_string(),
            target_secret_id: "shared/api-url".to_string(),
            transform,
        }
    }

    fn outputs() -> StackOutputs {
        StackOutputs::new().with_output("ApiUrl", "https://api.example.com/prod")
    }

    #[test]
    fn test_strip_path_suffix_keeps_authority() {
        let t = SecretTransform::StripPathSuffix;
        assert_eq!(
            t.apply("https://api.example.com/prod/v1"),
            "https://api.example.com"
        );
        assert_eq!(t.apply("https://api.example.com"), "https://api.example.com");
        assert_eq!(t.apply("host/path"), "host");
    }

    #[test]
    fn test_trim_trailing_slash() {
        let t = SecretTransform::TrimTrailingSlash;
        assert_eq!(t.apply("https://api.example.com/"), "https://api.example.com");
        assert_eq!(t.apply("https://api.example.com"), "https://api.example.com");
    }

    #[tokio::test]
    async fn test_provision_creates_then_noops() {
        let store = Arc::new(MemorySecretStore::new());
        let provisioner = SecretProvisioner::new(store.clone());
        let binding = binding(None);

        let first = provisioner.provision(&binding, &outputs()).await.unwrap();
        assert_eq!(first, ProvisionOutcome::Created);

        // Same binding, same source value: no second write.
        let second = provisioner.provision(&binding, &outputs()).await.unwrap();
        assert_eq!(second, ProvisionOutcome::Unchanged);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_overwrites_changed_value() {
        let store = Arc::new(MemorySecretStore::new());
        store.seed("shared/api-url", "https://old.example.com");
        let provisioner = SecretProvisioner::new(store.clone());

        let outcome = provisioner.provision(&binding(None), &outputs()).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Updated);
    }

    #[tokio::test]
    async fn test_provision_applies_transform_before_compare_and_write() {
        let store = Arc::new(MemorySecretStore::new());
        store.seed("shared/api-url", "https://api.example.com");
        let provisioner = SecretProvisioner::new(store.clone());

        let outcome = provisioner
            .provision(&binding(Some(SecretTransform::StripPathSuffix)), &outputs())
            .await
            .unwrap();
        // Transformed value matches what the store already holds.
        assert_eq!(outcome, ProvisionOutcome::Unchanged);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_output_is_fatal_for_binding() {
        let store = Arc::new(MemorySecretStore::new());
        let provisioner = SecretProvisioner::new(store);

        let result = provisioner
            .provision(&binding(None), &StackOutputs::new())
            .await;
        assert!(matches!(
            result,
            Err(ProvisionError::SourceValueMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_transient() {
        let store = Arc::new(MemorySecretStore::new());
        store.fail_next(1);
        let provisioner = SecretProvisioner::new(store);

        let result = provisioner.provision(&binding(None), &outputs()).await;
        match result {
            Err(err @ ProvisionError::StoreUnavailable { .. }) => assert!(err.is_transient()),
            other => panic!("expected StoreUnavailable, got {other:?}"),
        }
    }
}
