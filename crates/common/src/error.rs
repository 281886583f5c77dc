//! Common error types shared across crates.

use thiserror::Error;

/// Key derivation was handed structurally invalid input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDerivationError {
    /// The key identifier (salt) is empty.
    #[error("key identifier must not be empty")]
    EmptyIdentifier,

    /// The master secret is empty.
    #[error("master secret must not be empty")]
    EmptySecret,

    /// Imported key material has the wrong length.
    #[error("derived key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Imported key material is not valid base64url.
    #[error("key material is not valid base64url")]
    InvalidEncoding,
}

/// The cipher could not produce an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    /// No master secret is configured.
    #[error("encryption is disabled: no master secret configured")]
    Disabled,

    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),

    /// The underlying block cipher or AEAD rejected the operation.
    #[error("cipher failure: {0}")]
    Cipher(&'static str),
}

/// An envelope could not be opened.
///
/// Wrong keys and tampered envelopes both surface as
/// [`DecryptionError::IntegrityCheckFailed`]; the two cases are
/// indistinguishable by construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    /// No master secret is configured.
    #[error("decryption is disabled: no master secret configured")]
    Disabled,

    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),

    /// The envelope carries no recognised algorithm tag.
    #[error("unrecognised envelope format")]
    UnknownFormat,

    /// The envelope is tagged but structurally broken.
    #[error("malformed envelope: {0}")]
    Malformed(&'static str),

    /// Authentication tag mismatch: wrong key or tampered data.
    #[error("integrity check failed")]
    IntegrityCheckFailed,

    /// Authenticated plaintext had invalid block padding.
    #[error("invalid padding")]
    InvalidPadding,
}

/// A stored value matched neither an envelope openable under the available
/// keys nor legacy plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stored value at {key} is unreadable: {reason}")]
pub struct UnreadableValueError {
    /// Display form of the page key.
    pub key: String,
    /// Why the value could not be read.
    pub reason: String,
}

/// Errors produced by raw content stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is not valid notebook JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The addressed page does not exist.
    #[error("unknown page: {0}")]
    UnknownPage(String),

    /// The document is a single sealed token that none of the given keys opens.
    #[error("store document is a sealed token that no available key opens")]
    SealedDocument,
}

/// How a failure is propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the operation.
    Fatal,
    /// Degrade to storing plaintext.
    FailOpen,
    /// Replace the value with a visible placeholder on the read path.
    Sentinel,
    /// Report the value and continue with the rest of the batch.
    ReportAndSkip,
}

/// Top-level error type.
///
/// Variants map to a [`FailurePolicy`]:
/// - [`VaultError::KeyDerivation`] → fatal
/// - [`VaultError::Encryption`] → fail-open
/// - [`VaultError::Decryption`] → sentinel
/// - [`VaultError::Unreadable`] → report and skip
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error(transparent)]
    Unreadable(#[from] UnreadableValueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration is missing or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A strict migration found unreadable values and wrote nothing.
    #[error("migration aborted: {unreadable} unreadable value(s), nothing was written")]
    MigrationAborted { unreadable: usize },
}

impl VaultError {
    /// Returns the propagation policy for this error.
    pub fn policy(&self) -> FailurePolicy {
        match self {
            VaultError::KeyDerivation(_) => FailurePolicy::Fatal,
            VaultError::Encryption(_) => FailurePolicy::FailOpen,
            VaultError::Decryption(_) => FailurePolicy::Sentinel,
            VaultError::Unreadable(_) => FailurePolicy::ReportAndSkip,
            VaultError::Store(_) => FailurePolicy::Fatal,
            VaultError::Config(_) => FailurePolicy::Fatal,
            VaultError::MigrationAborted { .. } => FailurePolicy::Fatal,
        }
    }
}
