//! Shared secret store boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// What a secret write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    /// The secret did not exist and was created.
    Created,
    /// The secret existed with a different value and was overwritten.
    Updated,
}

/// Key/value secret store shared between stacks.
///
/// Guarantees required of implementations:
/// - `put` is last-writer-wins and reports whether it created or updated.
/// - `get` returns the current value, or `None` when the secret is absent.
/// - Reads and writes on distinct secret ids need no coordination.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Write `value` under `secret_id`.
    async fn put(&self, secret_id: &str, value: &str) -> ProviderResult<WriteDisposition>;

    /// Read the current value of `secret_id`.
    async fn get(&self, secret_id: &str) -> ProviderResult<Option<String>>;

    /// Check whether `secret_id` exists.
    async fn exists(&self, secret_id: &str) -> ProviderResult<bool>;
}
