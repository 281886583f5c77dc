//! Configuration loading and validation for the `rekey` operator CLI.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated CLI configuration. Command-line flags override these values.
#[derive(Debug, Clone, Deserialize)]
pub struct RekeyConfig {
    /// Tracing log level (`RUST_LOG` takes precedence).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Notebook document to operate on.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Key-derivation identifier.
    #[serde(default = "default_key_identifier")]
    pub key_identifier: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_data_file() -> PathBuf {
    PathBuf::from("data/notebooks.json")
}
fn default_key_identifier() -> String {
    "default_user".into()
}

impl RekeyConfig {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build rekey configuration")?;

        let c: RekeyConfig = cfg
            .try_deserialize()
            .context("failed to deserialise rekey configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Apply command-line overrides, then re-validate.
    pub fn with_overrides(
        mut self,
        data_file: Option<PathBuf>,
        key_identifier: Option<String>,
    ) -> Result<Self> {
        if let Some(path) = data_file {
            self.data_file = path;
        }
        if let Some(id) = key_identifier {
            self.key_identifier = id;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    fn validate(&self) -> Result<()> {
        if !self.log_format.eq_ignore_ascii_case("json")
            && !self.log_format.eq_ignore_ascii_case("pretty")
        {
            anyhow::bail!(
                "LOG_FORMAT must be \"pretty\" or \"json\", got {:?}",
                self.log_format
            );
        }
        if self.data_file.as_os_str().is_empty() {
            anyhow::bail!("DATA_FILE must not be empty");
        }
        if self.key_identifier.trim().is_empty() {
            anyhow::bail!("KEY_IDENTIFIER must not be empty");
        }
        Ok(())
    }
}
