//! Tracing subscriber setup.
//!
//! The filter comes from `RETOUCH_LOG` when set, otherwise from the
//! configuration file. Output goes to stderr; stdout carries results.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured log filter.
pub const LOG_ENV: &str = "RETOUCH_LOG";

/// Build the filter, preferring `RETOUCH_LOG` over `fallback`.
///
/// # Errors
///
/// Returns an error if `fallback` is not a valid filter directive.
pub fn filter(fallback: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|e| anyhow!("invalid log filter {fallback:?}: {e}"))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already
/// installed.
pub fn init(fallback: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(fallback)?)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}
