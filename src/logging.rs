//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; binaries call [`init_tracing`]
//! once at startup. The filter comes from `RUST_LOG`, then `NUTRILINK_LOG`,
//! then the caller's default directive.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted after `RUST_LOG`.
pub const LOG_ENV: &str = "NUTRILINK_LOG";

/// Pick the filter directive from the environment or fall back to `default`.
pub fn filter_directive<F>(lookup: F, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [EnvFilter::DEFAULT_ENV, LOG_ENV]
        .into_iter()
        .filter_map(|var| lookup(var))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Install a global fmt subscriber writing to stderr.
///
/// An unparseable directive falls back to `default_directive`. Returns an
/// error if a global subscriber is already set.
pub fn init_tracing(
    default_directive: &str,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let directive = filter_directive(|var| std::env::var(var).ok(), default_directive);
    let filter = EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
}
