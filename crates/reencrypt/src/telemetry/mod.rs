//! Telemetry initialisation for the `reencrypt` batch driver.
//!
//! Structured JSON logs go to **stderr**; stdout carries only envelopes.
//!
//! # Telemetry invariants
//!
//! - **No key material or plaintext** may appear in any log field.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialise the tracing subscriber at the configured log level.
///
/// `RUST_LOG`, when set, overrides `log_level`.
///
/// # Errors
///
/// Returns an error if the subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise reencrypt tracing subscriber: {e}"))
}
