//! Configuration loading and validation for content encryption.
//!
//! Values come from environment variables and an optional TOML secrets file.
//! The secrets file takes precedence over the environment. An absent or empty
//! `ENCRYPTION_MASTER_KEY` is not an error: it selects the supported
//! "encryption disabled" mode.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::{Algorithm, MasterSecret};

/// Default secrets file, relative to the working directory.
pub const DEFAULT_SECRETS_FILE: &str = "secrets.toml";

/// Environment variable overriding [`DEFAULT_SECRETS_FILE`].
pub const SECRETS_FILE_ENV: &str = "VAULT_SECRETS_FILE";

/// Validated encryption configuration.
#[derive(Clone, Deserialize)]
pub struct VaultConfig {
    /// Master secret, base64url or raw text. Absent ⇒ encryption disabled.
    #[serde(default)]
    pub encryption_master_key: Option<String>,

    /// Identifier used as the key-derivation salt.
    #[serde(default = "default_key_identifier")]
    pub key_identifier: String,

    /// Algorithm for newly written envelopes.
    #[serde(default)]
    pub envelope_algorithm: Algorithm,

    /// How long (seconds) a derived key stays cached. `0` disables the cache.
    #[serde(default = "default_key_cache_ttl")]
    pub key_cache_ttl_secs: u64,
}

fn default_key_identifier() -> String {
    "default_user".into()
}
fn default_key_cache_ttl() -> u64 {
    300
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            encryption_master_key: None,
            key_identifier: default_key_identifier(),
            envelope_algorithm: Algorithm::default(),
            key_cache_ttl_secs: default_key_cache_ttl(),
        }
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field(
                "encryption_master_key",
                &self.encryption_master_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("key_identifier", &self.key_identifier)
            .field("envelope_algorithm", &self.envelope_algorithm)
            .field("key_cache_ttl_secs", &self.key_cache_ttl_secs)
            .finish()
    }
}

impl VaultConfig {
    /// Load and validate configuration from the environment and the
    /// optional secrets file (`VAULT_SECRETS_FILE` or `secrets.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self> {
        let secrets_file =
            std::env::var(SECRETS_FILE_ENV).unwrap_or_else(|_| DEFAULT_SECRETS_FILE.to_owned());

        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .add_source(
                config::File::new(&secrets_file, config::FileFormat::Toml).required(false),
            )
            .build()
            .context("failed to build encryption configuration")?;

        Self::finish(cfg)
    }

    /// Load and validate configuration from a TOML file only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparsable, or invalid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .build()
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;

        Self::finish(cfg)
    }

    fn finish(cfg: config::Config) -> Result<Self> {
        let c: VaultConfig = cfg
            .try_deserialize()
            .context("failed to deserialise encryption configuration")?;
        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.key_identifier.trim().is_empty() {
            anyhow::bail!("KEY_IDENTIFIER must not be empty");
        }
        self.master_secret()?;
        Ok(())
    }

    /// Parse the configured master secret. `None` means encryption is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the configured value cannot form a secret.
    pub fn master_secret(&self) -> Result<Option<MasterSecret>> {
        match self.encryption_master_key.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => MasterSecret::parse(text)
                .map(Some)
                .context("ENCRYPTION_MASTER_KEY is invalid"),
        }
    }

    /// Key cache lifetime.
    pub fn key_cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.key_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_key_identifier(), "default_user");
        assert_eq!(default_key_cache_ttl(), 300);
        let cfg = VaultConfig::default();
        assert!(cfg.encryption_master_key.is_none());
        assert_eq!(cfg.envelope_algorithm, Algorithm::Fernet);
    }

    #[test]
    fn loads_secret_from_file() {
        let file = write_toml(
            r#"
encryption_master_key = "B1H0xgRBN7ERpLlOiqnJDf_h3FzuJuFQcaqdv4Y7zds="
"#,
        );
        let cfg = VaultConfig::from_file(file.path()).unwrap();
        let secret = cfg.master_secret().unwrap().unwrap();
        assert_eq!(secret.as_bytes().len(), 32);
        assert_eq!(cfg.key_identifier, "default_user");
    }

    #[test]
    fn loads_algorithm_and_ttl() {
        let file = write_toml(
            r#"
envelope_algorithm = "aes-256-gcm-siv"
key_cache_ttl_secs = 0
key_identifier = "team-notes"
"#,
        );
        let cfg = VaultConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.envelope_algorithm, Algorithm::Aes256GcmSiv);
        assert!(cfg.key_cache_ttl().is_zero());
        assert_eq!(cfg.key_identifier, "team-notes");
        assert!(cfg.master_secret().unwrap().is_none());
    }

    #[test]
    fn empty_secret_means_disabled() {
        let cfg = VaultConfig {
            encryption_master_key: Some(String::new()),
            ..VaultConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert!(cfg.master_secret().unwrap().is_none());
    }

    #[test]
    fn validate_rejects_empty_identifier() {
        let cfg = VaultConfig {
            key_identifier: "  ".into(),
            ..VaultConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let file = write_toml(r#"envelope_algorithm = "rot13""#);
        assert!(VaultConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = VaultConfig {
            encryption_master_key: Some("super secret value".into()),
            ..VaultConfig::default()
        };
        let s = format!("{cfg:?}");
        assert!(!s.contains("super secret value"));
        assert!(s.contains("REDACTED"));
    }
}
