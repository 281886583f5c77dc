//! Key derivation and envelope encryption primitives.
//!
//! This module is free of storage and configuration concerns. It provides the
//! pure operations the cipher, the persistence adapter and the re-key
//! procedure build on.
//!
//! # Envelope formats
//!
//! ```text
//! fernet:          base64url(0x80 | ts:u64 | iv:16 | aes-128-cbc ct | hmac-sha256:32)
//! aes-256-gcm-siv: v1.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! Both forms are ASCII and self-identifying, so [`envelope::open`] never
//! needs to be told which algorithm produced a value.

pub mod cipher;
pub mod envelope;
pub mod fernet;
pub mod kdf;

pub use envelope::Algorithm;
pub use kdf::{derive_key, DerivedKey, MasterSecret, DERIVED_KEY_LEN, PBKDF2_ITERATIONS};

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};

/// Fill a fixed-size buffer from the OS CSPRNG.
pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}
