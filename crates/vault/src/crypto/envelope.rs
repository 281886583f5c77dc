//! Algorithm-tagged envelopes: seal under a chosen algorithm, open by tag.

use std::fmt;
use std::str::FromStr;

use common::{DecryptionError, EncryptionError};
use serde::{Deserialize, Serialize};

use super::{cipher, fernet, kdf::DerivedKey};

/// Envelope algorithm used for new writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Fernet tokens. Readable by earlier deployments.
    #[default]
    #[serde(rename = "fernet")]
    Fernet,
    /// `v1.` AES-256-GCM-SIV envelopes.
    #[serde(rename = "aes-256-gcm-siv")]
    Aes256GcmSiv,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Fernet => "fernet",
            Algorithm::Aes256GcmSiv => "aes-256-gcm-siv",
        }
    }

    /// Identify the algorithm of an envelope from its tag, without opening it.
    pub fn detect(envelope: &[u8]) -> Option<Self> {
        let gcm_prefix = cipher::VERSION_PREFIX.as_bytes();
        if envelope.len() > gcm_prefix.len()
            && envelope.starts_with(gcm_prefix)
            && envelope[gcm_prefix.len()] == b'.'
        {
            Some(Algorithm::Aes256GcmSiv)
        } else if envelope.first() == Some(&b'g') {
            // base64url of a 0x80 version byte always begins with 'g'.
            Some(Algorithm::Fernet)
        } else {
            None
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fernet" => Ok(Algorithm::Fernet),
            "aes-256-gcm-siv" => Ok(Algorithm::Aes256GcmSiv),
            other => Err(format!(
                "unknown envelope algorithm {other:?} (expected \"fernet\" or \"aes-256-gcm-siv\")"
            )),
        }
    }
}

/// `true` if `envelope` is structurally a complete envelope of a known
/// algorithm, whether or not any particular key opens it.
pub fn is_well_formed(envelope: &[u8]) -> bool {
    match Algorithm::detect(envelope) {
        Some(Algorithm::Fernet) => fernet::is_well_formed(envelope),
        Some(Algorithm::Aes256GcmSiv) => std::str::from_utf8(envelope)
            .ok()
            .and_then(|text| text.parse::<cipher::EncryptedField>().ok())
            .is_some_and(|field| field.ciphertext.len() >= cipher::TAG_LEN),
        None => false,
    }
}

/// Seal `plaintext` under `key`.
///
/// # Errors
///
/// Propagates [`EncryptionError::Cipher`] from the underlying primitive.
pub fn seal(plaintext: &[u8], key: &DerivedKey, algorithm: Algorithm) -> Result<Vec<u8>, EncryptionError> {
    match algorithm {
        Algorithm::Fernet => fernet::encrypt(plaintext, key),
        Algorithm::Aes256GcmSiv => {
            cipher::encrypt_field(plaintext, key).map(|f| f.to_string_repr().into_bytes())
        }
    }
}

/// Open an envelope produced by [`seal`] under any algorithm.
///
/// # Errors
///
/// - [`DecryptionError::UnknownFormat`] if no algorithm tag is recognised.
/// - Any error of the selected algorithm (malformed, integrity, padding).
pub fn open(envelope: &[u8], key: &DerivedKey) -> Result<Vec<u8>, DecryptionError> {
    match Algorithm::detect(envelope) {
        Some(Algorithm::Fernet) => fernet::decrypt(envelope, key),
        Some(Algorithm::Aes256GcmSiv) => {
            let text = std::str::from_utf8(envelope)
                .map_err(|_| DecryptionError::Malformed("envelope is not ASCII"))?;
            let field: cipher::EncryptedField = text.parse()?;
            cipher::decrypt_field(&field, key)
        }
        None => Err(DecryptionError::UnknownFormat),
    }
}
