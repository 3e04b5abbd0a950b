//! Tracing setup for agentflow binaries.
//!
//! Libraries only emit `tracing` events; binaries call [`init_tracing`] once
//! at startup to print them.

#![warn(missing_docs, clippy::pedantic)]

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`.
///
/// # Errors
///
/// Fails when `default_filter` does not parse or a global subscriber is
/// already installed.
pub fn init_tracing_with(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|err| anyhow!("invalid log filter `{default_filter}`: {err}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

/// [`init_tracing_with`] using [`DEFAULT_FILTER`].
///
/// # Errors
///
/// See [`init_tracing_with`].
pub fn init_tracing() -> Result<()> {
    init_tracing_with(DEFAULT_FILTER)
}
