//! `reencrypt` — batch driver entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`](config::Config) from environment variables.
//! 2. Initialise structured JSON logging on stderr.
//! 3. Build the [`KeyRotator`] from the old key, new key, and cipher.
//! 4. Re-encrypt envelopes from stdin to stdout, one per line.

mod batch;
mod config;
mod telemetry;

use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use keyrotation::KeyRotator;
use tracing::info;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = config::Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        cipher = %cfg.app_cipher,
        serialized = cfg.serialized,
        "reencrypt starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key rotation
    // -----------------------------------------------------------------------
    let rotator = KeyRotator::new(&cfg.old_app_key, &cfg.app_key, &cfg.app_cipher)
        .context("failed to set up key rotation")?;

    // -----------------------------------------------------------------------
    // 4. Batch
    // -----------------------------------------------------------------------
    let stdin = io::stdin();
    let stdout = io::stdout();
    let summary = batch::run(
        &rotator,
        cfg.serialized,
        stdin.lock(),
        BufWriter::new(stdout.lock()),
    )?;

    info!(
        rotated = summary.rotated,
        failed = summary.failed,
        skipped = summary.skipped,
        "re-encryption finished"
    );
    if summary.failed > 0 {
        anyhow::bail!(
            "{} record(s) could not be re-encrypted and were left unchanged",
            summary.failed
        );
    }
    Ok(())
}
