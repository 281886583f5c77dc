//! AES-256-GCM-SIV envelopes.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant;
//! a repeated random nonce leaks only plaintext equality, not the key stream.
//!
//! The AES key is not the derived key itself but
//! `HMAC-SHA256(derived_key, "notevault/aes-256-gcm-siv/v1")`, so the same
//! derived key never feeds two different ciphers directly.

use std::str::FromStr;

use aes_gcm_siv::{
    aead::{Aead, KeyInit},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::{DecryptionError, EncryptionError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::kdf::{DerivedKey, DERIVED_KEY_LEN};

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Prefix that appears at the start of every GCM-SIV envelope.
pub const VERSION_PREFIX: &str = "v1";

const SUBKEY_LABEL: &[u8] = b"notevault/aes-256-gcm-siv/v1";

/// A parsed GCM-SIV envelope.
///
/// The string representation is `v1.<base64url(nonce)>.<base64url(ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Encode this value to its canonical string representation.
    pub fn to_string_repr(&self) -> String {
        format!(
            "{}.{}.{}",
            VERSION_PREFIX,
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        )
    }
}

impl FromStr for EncryptedField {
    type Err = DecryptionError;

    /// Parse an envelope string back into an [`EncryptedField`].
    ///
    /// Returns [`DecryptionError::Malformed`] if the string does not match
    /// the expected `v1.<nonce>.<ciphertext>` structure.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, '.').collect();
        if parts.len() != 3 || parts[0] != VERSION_PREFIX {
            return Err(DecryptionError::Malformed("expected v1.<nonce>.<ciphertext>"));
        }
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| DecryptionError::Malformed("nonce is not valid base64url"))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(DecryptionError::Malformed("nonce has the wrong length"));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&nonce_bytes);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| DecryptionError::Malformed("ciphertext is not valid base64url"))?;

        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// # Errors
///
/// Returns [`EncryptionError::Cipher`] on an internal AEAD error (should be
/// unreachable with a valid key and nonce).
pub fn encrypt_field(plaintext: &[u8], key: &DerivedKey) -> Result<EncryptedField, EncryptionError> {
    let cipher = build_cipher(key).map_err(|_| EncryptionError::Cipher("aes-256-gcm-siv key setup"))?;

    let nonce_bytes = super::random_bytes::<NONCE_LEN>();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| EncryptionError::Cipher("aead encrypt"))?;

    Ok(EncryptedField {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt an [`EncryptedField`] back to plaintext bytes.
///
/// # Errors
///
/// Returns [`DecryptionError::IntegrityCheckFailed`] if authentication fails
/// (wrong key or tampered data).
pub fn decrypt_field(field: &EncryptedField, key: &DerivedKey) -> Result<Vec<u8>, DecryptionError> {
    let cipher = build_cipher(key)?;
    cipher
        .decrypt(Nonce::from_slice(&field.nonce), field.ciphertext.as_slice())
        .map_err(|_| DecryptionError::IntegrityCheckFailed)
}

fn build_cipher(key: &DerivedKey) -> Result<Aes256GcmSiv, DecryptionError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| DecryptionError::Malformed("hmac key setup"))?;
    mac.update(SUBKEY_LABEL);
    let subkey = mac.finalize().into_bytes();
    debug_assert_eq!(subkey.len(), DERIVED_KEY_LEN);
    Aes256GcmSiv::new_from_slice(&subkey).map_err(|_| DecryptionError::Malformed("aes-256 key setup"))
}
