//! Persistence adapter: the only place page content crosses the cipher.

use common::protocol::{
    encode_encrypted, DECRYPT_FAILED_SENTINEL, ENCRYPTION_DISABLED_SENTINEL,
};
use common::{DecryptionError, PageKey, StoredValue, VaultError};
use tracing::warn;

use crate::content::ContentCipher;
use crate::store::ContentStore;

/// Reads and writes page content through a [`ContentCipher`].
#[derive(Debug)]
pub struct PageRepository<S> {
    store: S,
    cipher: ContentCipher,
    identifier: String,
}

impl<S: ContentStore> PageRepository<S> {
    pub fn new(store: S, cipher: ContentCipher, identifier: impl Into<String>) -> Self {
        Self {
            store,
            cipher,
            identifier: identifier.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cipher(&self) -> &ContentCipher {
        &self.cipher
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Produce the stored text for `plaintext`.
    ///
    /// When encryption is enabled this is `ENC:` + hex of the envelope. If
    /// encryption is disabled, or fails, the raw text is stored untagged
    /// (fail-open) and can never be mistaken for ciphertext.
    pub fn encode(&self, plaintext: &str) -> String {
        if !self.cipher.is_enabled() {
            return plaintext.to_owned();
        }
        match self.cipher.try_encrypt(plaintext.as_bytes(), &self.identifier) {
            Ok(envelope) => encode_encrypted(&envelope),
            Err(e) => {
                warn!(error = %e, "content encryption failed; storing plaintext (fail-open)");
                plaintext.to_owned()
            }
        }
    }

    /// Turn stored text back into plaintext.
    ///
    /// # Errors
    ///
    /// [`DecryptionError`] if the value is tagged but cannot be opened, or is
    /// tagged while encryption is disabled.
    pub fn decode(&self, stored: &str) -> Result<String, DecryptionError> {
        match StoredValue::parse(stored)? {
            StoredValue::Plain(text) => Ok(text.to_owned()),
            StoredValue::Encrypted(envelope) => {
                let plaintext = self.cipher.decrypt(&envelope, &self.identifier)?;
                String::from_utf8(plaintext)
                    .map_err(|_| DecryptionError::Malformed("plaintext is not UTF-8"))
            }
        }
    }

    /// Encrypt (when enabled) and store `plaintext` for `key`.
    ///
    /// # Errors
    ///
    /// Only store failures propagate; encryption failures fail open.
    pub fn save_content(&mut self, key: &PageKey, plaintext: &str) -> Result<(), VaultError> {
        let stored = self.encode(plaintext);
        self.store.write(key, &stored)?;
        Ok(())
    }

    /// Load and decrypt the content at `key`. A missing page reads as `None`.
    ///
    /// # Errors
    ///
    /// [`VaultError::Store`] on store failure, [`VaultError::Decryption`]
    /// when a tagged value cannot be opened.
    pub fn read_content(&self, key: &PageKey) -> Result<Option<String>, VaultError> {
        match self.store.read(key)? {
            Some(stored) => Ok(Some(self.decode(&stored)?)),
            None => Ok(None),
        }
    }

    /// Load content for display.
    ///
    /// Never fails: a missing page is `""`, an undecryptable value is
    /// [`DECRYPT_FAILED_SENTINEL`], and a tagged value with encryption
    /// disabled is [`ENCRYPTION_DISABLED_SENTINEL`].
    pub fn load_content(&self, key: &PageKey) -> String {
        match self.read_content(key) {
            Ok(content) => content.unwrap_or_default(),
            Err(VaultError::Decryption(DecryptionError::Disabled)) => {
                warn!(page = %key, "content is encrypted but encryption is disabled");
                ENCRYPTION_DISABLED_SENTINEL.to_owned()
            }
            Err(e) => {
                warn!(page = %key, error = %e, "failed to load page content");
                DECRYPT_FAILED_SENTINEL.to_owned()
            }
        }
    }
}
