//! `tracing` subscriber setup for the `segue` binary and embedding applications

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Filter from `RUST_LOG`, or `default_filter` when unset or unparsable
#[must_use]
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a global subscriber writing to stderr, as JSON lines when `json` is set.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str, json: bool) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    }
}
