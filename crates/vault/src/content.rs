//! [`ContentCipher`]: the encrypt/decrypt entry point used by the persistence layer.

use std::sync::Arc;

use anyhow::Result;
use common::{DecryptionError, EncryptionError};
use tracing::warn;

use crate::config::VaultConfig;
use crate::crypto::{envelope, Algorithm, DerivedKey, MasterSecret};
use crate::keys::{KeyCache, SecretStore};

/// Encrypts and decrypts page content under per-identifier derived keys.
///
/// Cheap to clone; clones share the secret and the key cache.
#[derive(Clone, Debug)]
pub struct ContentCipher {
    secrets: SecretStore,
    cache: KeyCache,
    algorithm: Algorithm,
}

impl ContentCipher {
    pub fn new(secrets: SecretStore, cache: KeyCache, algorithm: Algorithm) -> Self {
        Self {
            secrets,
            cache,
            algorithm,
        }
    }

    /// Build a cipher from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured secret cannot be parsed.
    pub fn from_config(cfg: &VaultConfig) -> Result<Self> {
        Ok(Self::new(
            SecretStore::new(cfg.master_secret()?),
            KeyCache::new(cfg.key_cache_ttl()),
            cfg.envelope_algorithm,
        ))
    }

    /// A cipher with no secret: every write stays plaintext.
    pub fn disabled() -> Self {
        Self::new(
            SecretStore::disabled(),
            KeyCache::new(std::time::Duration::ZERO),
            Algorithm::default(),
        )
    }

    /// Returns `true` iff a master secret is currently configured.
    ///
    /// Re-evaluated on every call; callers must check this before relying on
    /// [`encrypt`](Self::encrypt) for confidentiality.
    pub fn is_enabled(&self) -> bool {
        self.secrets.is_configured()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Swap the master secret (or remove it) and drop every cached key.
    pub fn replace_secret(&self, secret: Option<MasterSecret>) {
        self.secrets.replace(secret);
        self.cache.clear();
    }

    /// Encrypt `plaintext` for `identifier`, failing open.
    ///
    /// SECURITY TRADE-OFF: on any failure (no secret, bad identifier, cipher
    /// error) the plaintext is returned unchanged so the write still
    /// succeeds. Availability wins over confidentiality here. Use
    /// [`try_encrypt`](Self::try_encrypt) where plaintext must never be
    /// mistaken for an envelope.
    pub fn encrypt(&self, plaintext: &[u8], identifier: &str) -> Vec<u8> {
        match self.try_encrypt(plaintext, identifier) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "encryption failed; returning plaintext (fail-open)");
                plaintext.to_vec()
            }
        }
    }

    /// Encrypt `plaintext` for `identifier`.
    ///
    /// # Errors
    ///
    /// - [`EncryptionError::Disabled`] if no secret is configured.
    /// - [`EncryptionError::KeyDerivation`] for an empty identifier.
    /// - [`EncryptionError::Cipher`] on an internal cipher failure.
    pub fn try_encrypt(&self, plaintext: &[u8], identifier: &str) -> Result<Vec<u8>, EncryptionError> {
        let key = self.key_for(identifier).ok_or(EncryptionError::Disabled)??;
        envelope::seal(plaintext, &key, self.algorithm)
    }

    /// Verify and decrypt `envelope` for `identifier`.
    ///
    /// # Errors
    ///
    /// - [`DecryptionError::Disabled`] if no secret is configured.
    /// - [`DecryptionError::IntegrityCheckFailed`] on a wrong key or tampering.
    /// - [`DecryptionError::UnknownFormat`] / [`DecryptionError::Malformed`]
    ///   for inputs that are not envelopes.
    pub fn decrypt(&self, envelope: &[u8], identifier: &str) -> Result<Vec<u8>, DecryptionError> {
        let key = self.key_for(identifier).ok_or(DecryptionError::Disabled)??;
        envelope::open(envelope, &key)
    }

    /// `None` when disabled; otherwise the (possibly cached) derived key.
    fn key_for(
        &self,
        identifier: &str,
    ) -> Option<Result<Arc<DerivedKey>, common::KeyDerivationError>> {
        let secret = self.secrets.current()?;
        Some(self.cache.get_or_derive(identifier, &secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SCENARIO_SECRET: &str = "B1H0xgRBN7ERpLlOiqnJDf_h3FzuJuFQcaqdv4Y7zds=";

    fn enabled(secret: &str, algorithm: Algorithm) -> ContentCipher {
        ContentCipher::new(
            SecretStore::new(Some(MasterSecret::parse(secret).unwrap())),
            KeyCache::new(Duration::from_secs(60)),
            algorithm,
        )
    }

    #[test]
    fn scenario_round_trip_and_single_byte_tamper() {
        let cipher = enabled(SCENARIO_SECRET, Algorithm::Fernet);
        assert!(cipher.is_enabled());
        let plaintext = "# Hello\n- [ ] todo";
        let env = cipher.encrypt(plaintext.as_bytes(), "default_user");
        assert_ne!(env, plaintext.as_bytes());
        assert_eq!(
            cipher.decrypt(&env, "default_user").unwrap(),
            plaintext.as_bytes()
        );

        for i in 0..env.len() {
            let mut tampered = env.clone();
            tampered[i] = tampered[i].wrapping_add(1);
            assert!(
                cipher.decrypt(&tampered, "default_user").is_err(),
                "byte {i} change went undetected"
            );
        }
    }

    #[test]
    fn gcm_siv_round_trip() {
        let cipher = enabled(SCENARIO_SECRET, Algorithm::Aes256GcmSiv);
        let env = cipher.try_encrypt(b"body", "default_user").unwrap();
        assert!(env.starts_with(b"v1."));
        assert_eq!(cipher.decrypt(&env, "default_user").unwrap(), b"body");
    }

    #[test]
    fn identifier_isolation() {
        let cipher = enabled(SCENARIO_SECRET, Algorithm::Fernet);
        let env = cipher.try_encrypt(b"private", "alice").unwrap();
        assert_eq!(
            cipher.decrypt(&env, "bob").unwrap_err(),
            DecryptionError::IntegrityCheckFailed
        );
    }

    #[test]
    fn fail_open_without_secret() {
        let cipher = ContentCipher::disabled();
        assert!(!cipher.is_enabled());
        assert_eq!(cipher.encrypt(b"abc", "default_user"), b"abc");
        assert_eq!(
            cipher.try_encrypt(b"abc", "default_user").unwrap_err(),
            EncryptionError::Disabled
        );
        assert_eq!(
            cipher.decrypt(b"gAAAA", "default_user").unwrap_err(),
            DecryptionError::Disabled
        );
    }

    #[test]
    fn fail_open_on_bad_identifier() {
        let cipher = enabled(SCENARIO_SECRET, Algorithm::Fernet);
        assert_eq!(cipher.encrypt(b"abc", ""), b"abc");
        assert!(matches!(
            cipher.try_encrypt(b"abc", ""),
            Err(EncryptionError::KeyDerivation(_))
        ));
    }

    #[test]
    fn enabled_flag_tracks_secret_changes() {
        let cipher = ContentCipher::disabled();
        let shared = cipher.clone();
        cipher.replace_secret(Some(MasterSecret::parse(SCENARIO_SECRET).unwrap()));
        assert!(shared.is_enabled());
        cipher.replace_secret(None);
        assert!(!shared.is_enabled());
    }

    #[test]
    fn rotated_secret_cannot_open_old_envelopes() {
        let cipher = enabled(SCENARIO_SECRET, Algorithm::Fernet);
        let env = cipher.try_encrypt(b"before rotation", "default_user").unwrap();
        cipher.replace_secret(Some(MasterSecret::parse("a different secret").unwrap()));
        assert!(cipher.decrypt(&env, "default_user").is_err());
    }

    #[test]
    fn from_config_respects_disabled_mode() {
        let cipher = ContentCipher::from_config(&VaultConfig::default()).unwrap();
        assert!(!cipher.is_enabled());
    }
}
