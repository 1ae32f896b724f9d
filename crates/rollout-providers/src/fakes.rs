//! In-memory fakes for provider traits (testing only)
//!
//! Provides `MemoryDeployer`, `MemorySecretStore`, `MemoryIdentityProvider`,
//! and `MemoryInvoker` that satisfy the trait contracts without any external
//! dependencies. Failures can be scripted per target so retry, containment,
//! and cancellation paths are exercised deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use crate::deploy::{StackDeployer, StackOutputs};
use crate::error::{ProviderError, ProviderResult};
use crate::identity::{IdentityProvider, SessionCredentials};
use crate::invoke::{EndpointInvoker, InvokeResponse};
use crate::secret::{SecretStore, WriteDisposition};

// ---------------------------------------------------------------------------
// MemoryDeployer
// ---------------------------------------------------------------------------

/// In-memory stack deployer with scriptable per-stack outputs and failures.
#[derive(Debug, Default)]
pub struct MemoryDeployer {
    outputs: Mutex<HashMap<String, StackOutputs>>,
    failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    current: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outputs a stack reports once deployed.
    pub fn set_outputs(&self, stack: &str, outputs: StackOutputs) {
        self.outputs
            .lock()
            .unwrap()
            .insert(stack.to_string(), outputs);
    }

    /// Queue a failure for the next deploy of `stack`. Queued failures are
    /// consumed in order; once drained, deploys succeed.
    pub fn push_failure(&self, stack: &str, error: ProviderError) {
        self.failures
            .lock()
            .unwrap()
            .entry(stack.to_string())
            .or_default()
            .push_back(error);
    }

    /// Mark a stack as already deployed, so the next deploy reports
    /// `already_current` (idempotent re-run).
    pub fn mark_current(&self, stack: &str) {
        self.current.lock().unwrap().insert(stack.to_string());
    }

    /// Every stack name passed to `deploy`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of deploy calls made for `stack`.
    pub fn call_count(&self, stack: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == stack)
            .count()
    }
}

#[async_trait]
impl StackDeployer for MemoryDeployer {
    async fn deploy(&self, stack_name: &str) -> ProviderResult<StackOutputs> {
        self.calls.lock().unwrap().push(stack_name.to_string());

        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(stack_name)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let mut outputs = self
            .outputs
            .lock()
            .unwrap()
            .get(stack_name)
            .cloned()
            .unwrap_or_default();

        let mut current = self.current.lock().unwrap();
        outputs.already_current = current.contains(stack_name);
        current.insert(stack_name.to_string());

        Ok(outputs)
    }
}

// ---------------------------------------------------------------------------
// MemorySecretStore
// ---------------------------------------------------------------------------

/// In-memory secret store backed by a `HashMap<secret_id, value>`.
///
/// `fail_next` makes the following N operations report an unavailable store,
/// for exercising transient-retry paths.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
    fail_next: Mutex<u32>,
    writes: Mutex<Vec<String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing secret value.
    pub fn seed(&self, secret_id: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), value.to_string());
    }

    /// Make the next `count` operations fail with a network error.
    pub fn fail_next(&self, count: u32) {
        *self.fail_next.lock().unwrap() = count;
    }

    /// Secret ids written via `put`, in call order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn check_available(&self) -> ProviderResult<()> {
        let mut remaining = self.fail_next.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ProviderError::Network {
                detail: "secret store unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn put(&self, secret_id: &str, value: &str) -> ProviderResult<WriteDisposition> {
        self.check_available()?;
        self.writes.lock().unwrap().push(secret_id.to_string());
        let previous = self
            .secrets
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), value.to_string());
        Ok(match previous {
            Some(_) => WriteDisposition::Updated,
            None => WriteDisposition::Created,
        })
    }

    async fn get(&self, secret_id: &str) -> ProviderResult<Option<String>> {
        self.check_available()?;
        Ok(self.secrets.lock().unwrap().get(secret_id).cloned())
    }

    async fn exists(&self, secret_id: &str) -> ProviderResult<bool> {
        self.check_available()?;
        Ok(self.secrets.lock().unwrap().contains_key(secret_id))
    }
}

// ---------------------------------------------------------------------------
// MemoryIdentityProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RoleEntry {
    allowed_external_ids: HashSet<String>,
    transient_failures: u32,
}

/// In-memory identity provider with per-role trust scripting.
///
/// Roles are unknown until registered; a registered role only accepts the
/// external ids it was registered with, mirroring a trust policy condition.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    roles: Mutex<HashMap<String, RoleEntry>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role whose trust policy accepts `external_id`.
    pub fn allow(&self, role_arn: &str, external_id: &str) {
        let mut roles = self.roles.lock().unwrap();
        roles
            .entry(role_arn.to_string())
            .or_default()
            .allowed_external_ids
            .insert(external_id.to_string());
    }

    /// Register a role that exists but accepts no external id at all.
    pub fn deny_all(&self, role_arn: &str) {
        self.roles.lock().unwrap().entry(role_arn.to_string()).or_default();
    }

    /// Make the next `count` assumptions of `role_arn` fail with throttling.
    pub fn throttle_next(&self, role_arn: &str, count: u32) {
        self.roles
            .lock()
            .unwrap()
            .entry(role_arn.to_string())
            .or_default()
            .transient_failures = count;
    }

    /// Role ARNs passed to `assume_role`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn assume_role(
        &self,
        role_arn: &str,
        external_id: &str,
        session_name: &str,
    ) -> ProviderResult<SessionCredentials> {
        self.calls.lock().unwrap().push(role_arn.to_string());

        let mut roles = self.roles.lock().unwrap();
        let entry = roles.get_mut(role_arn).ok_or_else(|| ProviderError::NotFound {
            resource: role_arn.to_string(),
        })?;

        if entry.transient_failures > 0 {
            entry.transient_failures -= 1;
            return Err(ProviderError::Throttled {
                detail: "sts rate exceeded".to_string(),
            });
        }

        if !entry.allowed_external_ids.contains(external_id) {
            return Err(ProviderError::AccessDenied {
                detail: format!("trust policy rejects external id for {role_arn}"),
            });
        }

        Ok(SessionCredentials {
            access_key_id: "FAKEACCESSKEY".to_string(),
            secret_access_key: "fake-secret".to_string(),
            session_token: format!("fake-token-{session_name}"),
            expires_at: Utc::now() + ChronoDuration::minutes(15),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryInvoker
// ---------------------------------------------------------------------------

/// In-memory endpoint invoker with scripted per-target responses.
///
/// Responses queued for a target are consumed in order; the last one is
/// sticky. Unscripted targets report `NotFound`.
#[derive(Debug, Default)]
pub struct MemoryInvoker {
    responses: Mutex<HashMap<String, VecDeque<ProviderResult<InvokeResponse>>>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `target`.
    pub fn respond(&self, target: &str, response: InvokeResponse) {
        self.push(target, Ok(response));
    }

    /// Queue a failure for `target`.
    pub fn fail(&self, target: &str, error: ProviderError) {
        self.push(target, Err(error));
    }

    fn push(&self, target: &str, result: ProviderResult<InvokeResponse>) {
        self.responses
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .push_back(result);
    }

    /// Targets passed to `call`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EndpointInvoker for MemoryInvoker {
    async fn call(
        &self,
        target: &str,
        _payload: Option<&serde_json::Value>,
        _timeout: Duration,
    ) -> ProviderResult<InvokeResponse> {
        self.calls.lock().unwrap().push(target.to_string());

        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(target)
            .ok_or_else(|| ProviderError::NotFound {
                resource: target.to_string(),
            })?;

        match queue.len() {
            0 => Err(ProviderError::NotFound {
                resource: target.to_string(),
            }),
            // Sticky last response: peek without consuming.
            1 => queue.front().cloned().ok_or_else(|| ProviderError::NotFound {
                resource: target.to_string(),
            })?,
            _ => queue.pop_front().ok_or_else(|| ProviderError::NotFound {
                resource: target.to_string(),
            })?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deployer_scripted_failure_then_success() {
        let deployer = MemoryDeployer::new();
        deployer.set_outputs("data", StackOutputs::new().with_output("TableName", "t"));
        deployer.push_failure(
            "data",
            ProviderError::Throttled {
                detail: "slow down".to_string(),
            },
        );

        let first = deployer.deploy("data").await;
        assert!(matches!(first, Err(ProviderError::Throttled { .. })));

        let second = deployer.deploy("data").await.unwrap();
        assert_eq!(second.get("TableName"), Some("t"));
        assert_eq!(deployer.call_count("data"), 2);
    }

    #[tokio::test]
    async fn test_deployer_reports_already_current_on_rerun() {
        let deployer = MemoryDeployer::new();
        let first = deployer.deploy("api").await.unwrap();
        assert!(!first.already_current);

        let second = deployer.deploy("api").await.unwrap();
        assert!(second.already_current);
    }

    #[tokio::test]
    async fn test_secret_store_put_get_dispositions() {
        let store = MemorySecretStore::new();
        assert_eq!(
            store.put("db-url", "postgres://a").await.unwrap(),
            WriteDisposition::Created
        );
        assert_eq!(
            store.put("db-url", "postgres://b").await.unwrap(),
            WriteDisposition::Updated
        );
        assert_eq!(
            store.get("db-url").await.unwrap(),
            Some("postgres://b".to_string())
        );
        assert!(store.exists("db-url").await.unwrap());
        assert!(!store.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_secret_store_scripted_unavailability() {
        let store = MemorySecretStore::new();
        store.fail_next(1);
        assert!(matches!(
            store.get("any").await,
            Err(ProviderError::Network { .. })
        ));
        assert!(store.get("any").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_unknown_role_is_not_found() {
        let identity = MemoryIdentityProvider::new();
        let result = identity
            .assume_role("arn:aws:iam::111:role/missing", "ext", "session")
            .await;
        assert!(matches!(result, Err(ProviderError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_identity_external_id_mismatch_is_denied() {
        let identity = MemoryIdentityProvider::new();
        identity.allow("arn:aws:iam::111:role/deployer", "expected-id");

        let result = identity
            .assume_role("arn:aws:iam::111:role/deployer", "wrong-id", "session")
            .await;
        assert!(matches!(result, Err(ProviderError::AccessDenied { .. })));

        let result = identity
            .assume_role("arn:aws:iam::111:role/deployer", "expected-id", "session")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invoker_sticky_last_response() {
        let invoker = MemoryInvoker::new();
        invoker.respond("https://api/instances", InvokeResponse::new(200, "[]"));

        for _ in 0..3 {
            let resp = invoker
                .call("https://api/instances", None, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(resp.status, 200);
        }
        assert_eq!(invoker.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_invoker_unknown_target_is_not_found() {
        let invoker = MemoryInvoker::new();
        let result = invoker
            .call("https://api/none", None, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ProviderError::NotFound { .. })));
    }
}
