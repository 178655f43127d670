#![forbid(unsafe_code)]

//! Log subscriber setup.
//!
//! Bindy logs through `tracing`: warnings for configuration gaps (missing
//! converters, unresolved members), debug events for routing decisions and
//! trace events for guard hits. These helpers install a `fmt` subscriber
//! whose filter comes from `BINDY_LOG`, falling back to `RUST_LOG`, then
//! to `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;

/// Environment variable checked first for the log filter.
pub const ENV_VAR: &str = "BINDY_LOG";

/// Filter from `BINDY_LOG`, then `RUST_LOG`, then `warn`.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn try_init() -> Result<(), TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let registry = tracing_subscriber::registry().with(env_filter());
    #[cfg(feature = "logging-json")]
    {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    }
    #[cfg(not(feature = "logging-json"))]
    {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}

/// Install the global subscriber, ignoring an already installed one.
pub fn init() {
    if try_init().is_err() {
        tracing::debug!("a global tracing subscriber is already installed");
    }
}
