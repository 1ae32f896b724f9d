//! Tracing initialisation for rollout binaries.
//!
//! Call [`init_tracing`] once at program start. Verbosity comes from
//! `RUST_LOG` when set, otherwise from the supplied default level. With
//! `json = true`, log lines are emitted as newline-delimited JSON for
//! aggregation pipelines.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// Safe to call more than once; only the first call takes effect (the
/// global subscriber can only be installed once per process).
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
