//! Provider boundary for the rollout orchestration core
//!
//! These traits define the four collaborators the orchestrator delegates to:
//! - `StackDeployer`: deploy one named stack and report its live outputs
//! - `SecretStore`: shared secret reads and idempotent writes
//! - `IdentityProvider`: cross-account role assumption (read-only)
//! - `EndpointInvoker`: call a live endpoint or function with a deadline
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module; command-backed and HTTP-backed
//! adapters for real use via `command` and `http`.

pub mod command;
pub mod deploy;
pub mod error;
pub mod fakes;
pub mod http;
pub mod identity;
pub mod invoke;
pub mod secret;

pub use command::{
    CommandDeployer, CommandIdentityProvider, CommandProviderConfig, CommandSecretStore,
};
pub use deploy::{StackDeployer, StackOutputs};
pub use error::{ProviderError, ProviderErrorKind, ProviderResult};
pub use http::HttpInvoker;
pub use identity::{IdentityProvider, SessionCredentials};
pub use invoke::{EndpointInvoker, InvokeResponse};
pub use secret::{SecretStore, WriteDisposition};
