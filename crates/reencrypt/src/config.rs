//! Configuration loading and validation for the `reencrypt` batch driver.
//!
//! All values are read from environment variables at startup, using the same
//! names an application's own environment file carries (`APP_KEY`,
//! `APP_CIPHER`). The process exits with a clear error message if any
//! required variable is missing or invalid.

use std::fmt;

use anyhow::{Context, Result};
use keyrotation::Cipher;
use serde::Deserialize;

/// Validated driver configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// The retiring key, `base64:`-prefixed or literal. **Required.**
    pub old_app_key: String,

    /// The replacement key, `base64:`-prefixed or literal. **Required.**
    pub app_key: String,

    /// Cipher both keys are used with.
    #[serde(default = "default_cipher")]
    pub app_cipher: String,

    /// Whether the stored values are serialized rather than raw strings.
    #[serde(default)]
    pub serialized: bool,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cipher() -> String {
    "AES-256-CBC".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.old_app_key, "OLD_APP_KEY")?;
        ensure_non_empty(&self.app_key, "APP_KEY")?;
        self.app_cipher
            .parse::<Cipher>()
            .context("APP_CIPHER is not a supported cipher")?;
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("old_app_key", &"[REDACTED]")
            .field("app_key", &"[REDACTED]")
            .field("app_cipher", &self.app_cipher)
            .field("serialized", &self.serialized)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
