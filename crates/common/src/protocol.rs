//! Text representation of a page content field in storage.
//!
//! The storage column is text, so an envelope is written as
//! `ENC:<lowercase hex of envelope bytes>`. Anything without the marker is
//! legacy plaintext and is returned verbatim.

use crate::error::DecryptionError;

/// Prefix marking a stored value as an encrypted envelope.
pub const ENCRYPTED_MARKER: &str = "ENC:";

/// Returned on the read path when an envelope cannot be opened.
pub const DECRYPT_FAILED_SENTINEL: &str = "Error decrypting content";

/// Returned on the read path when a value is encrypted but no secret is configured.
pub const ENCRYPTION_DISABLED_SENTINEL: &str = "Content is encrypted but encryption is disabled.";

/// A parsed stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue<'a> {
    /// Raw envelope bytes recovered from the hex body.
    Encrypted(Vec<u8>),
    /// Untagged plaintext.
    Plain(&'a str),
}

impl<'a> StoredValue<'a> {
    /// Parse the text stored in the content column.
    ///
    /// # Errors
    ///
    /// Returns [`DecryptionError::Malformed`] if the marker is present but the
    /// body is not valid hex.
    pub fn parse(raw: &'a str) -> Result<Self, DecryptionError> {
        match raw.strip_prefix(ENCRYPTED_MARKER) {
            Some(body) => hex::decode(body)
                .map(StoredValue::Encrypted)
                .map_err(|_| DecryptionError::Malformed("stored envelope is not valid hex")),
            None => Ok(StoredValue::Plain(raw)),
        }
    }

    /// Render this value in its storage text form.
    pub fn to_stored_text(&self) -> String {
        match self {
            StoredValue::Encrypted(envelope) => encode_encrypted(envelope),
            StoredValue::Plain(text) => (*text).to_owned(),
        }
    }
}

/// `ENC:` + hex of `envelope`.
pub fn encode_encrypted(envelope: &[u8]) -> String {
    format!("{ENCRYPTED_MARKER}{}", hex::encode(envelope))
}

/// Returns `true` if `raw` carries the encrypted marker.
pub fn is_marked_encrypted(raw: &str) -> bool {
    raw.starts_with(ENCRYPTED_MARKER)
}
