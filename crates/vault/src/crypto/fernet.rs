//! Fernet tokens: AES-128-CBC + HMAC-SHA256, encrypt-then-MAC.
//!
//! Tokens produced here are byte-for-byte compatible with the Fernet
//! specification, so content written by earlier deployments can be opened
//! and re-keyed. The 32-byte derived key splits into a signing half
//! (`0..16`) and an encryption half (`16..32`).

use std::time::{SystemTime, UNIX_EPOCH};

use aes::Aes128;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use common::{DecryptionError, EncryptionError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::kdf::DerivedKey;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// First byte of every decoded token.
pub const VERSION: u8 = 0x80;

const TIMESTAMP_LEN: usize = 8;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const TAG_LEN: usize = 32;
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN + IV_LEN;

/// Encrypt `plaintext` into a base64url token, using a fresh random IV and
/// the current time.
///
/// # Errors
///
/// Returns [`EncryptionError::Cipher`] if the cipher cannot be keyed
/// (unreachable with a valid [`DerivedKey`]).
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> Result<Vec<u8>, EncryptionError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    encrypt_with(plaintext, key, super::random_bytes::<IV_LEN>(), timestamp)
}

/// Encrypt with an explicit IV and timestamp.
pub(crate) fn encrypt_with(
    plaintext: &[u8],
    key: &DerivedKey,
    iv: [u8; IV_LEN],
    timestamp: u64,
) -> Result<Vec<u8>, EncryptionError> {
    let (signing_key, encryption_key) = split_key(key);

    let ciphertext = Aes128CbcEnc::new_from_slices(encryption_key, &iv)
        .map_err(|_| EncryptionError::Cipher("aes-128-cbc key setup"))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
    token.push(VERSION);
    token.extend_from_slice(&timestamp.to_be_bytes());
    token.extend_from_slice(&iv);
    token.extend_from_slice(&ciphertext);

    let mut mac = HmacSha256::new_from_slice(signing_key)
        .map_err(|_| EncryptionError::Cipher("hmac key setup"))?;
    mac.update(&token);
    token.extend_from_slice(&mac.finalize().into_bytes());

    Ok(URL_SAFE.encode(token).into_bytes())
}

/// Verify and decrypt a base64url token.
///
/// The HMAC is checked (in constant time) before any decryption happens.
/// Token age is not enforced.
///
/// # Errors
///
/// - [`DecryptionError::Malformed`] for bad base64 or impossible lengths.
/// - [`DecryptionError::UnknownFormat`] if the version byte is not `0x80`.
/// - [`DecryptionError::IntegrityCheckFailed`] on a wrong key or tampering.
/// - [`DecryptionError::InvalidPadding`] if authenticated data unpads badly.
pub fn decrypt(token: &[u8], key: &DerivedKey) -> Result<Vec<u8>, DecryptionError> {
    let data = decode_token(token)?;

    let (signing_key, encryption_key) = split_key(key);
    let (signed, tag) = data.split_at(data.len() - TAG_LEN);

    let mut mac = HmacSha256::new_from_slice(signing_key)
        .map_err(|_| DecryptionError::Malformed("hmac key setup"))?;
    mac.update(signed);
    mac.verify_slice(tag)
        .map_err(|_| DecryptionError::IntegrityCheckFailed)?;

    let iv = &signed[1 + TIMESTAMP_LEN..HEADER_LEN];
    let ciphertext = &signed[HEADER_LEN..];
    Aes128CbcDec::new_from_slices(encryption_key, iv)
        .map_err(|_| DecryptionError::Malformed("aes-128-cbc key setup"))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| DecryptionError::InvalidPadding)
}

/// `true` if `token` has the shape of a Fernet token: base64url, a valid
/// length, and the `0x80` version byte. Says nothing about which key made it.
pub fn is_well_formed(token: &[u8]) -> bool {
    decode_token(token).is_ok()
}

fn decode_token(token: &[u8]) -> Result<Vec<u8>, DecryptionError> {
    let data = URL_SAFE
        .decode(token)
        .map_err(|_| DecryptionError::Malformed("fernet token is not valid base64url"))?;

    if data.len() < HEADER_LEN + BLOCK_LEN + TAG_LEN
        || (data.len() - HEADER_LEN - TAG_LEN) % BLOCK_LEN != 0
    {
        return Err(DecryptionError::Malformed("fernet token has an invalid length"));
    }
    if data[0] != VERSION {
        return Err(DecryptionError::UnknownFormat);
    }
    Ok(data)
}

/// Read the creation timestamp of a token without verifying it.
pub fn timestamp(token: &[u8]) -> Option<u64> {
    let data = URL_SAFE.decode(token).ok()?;
    if data.len() < HEADER_LEN || data[0] != VERSION {
        return None;
    }
    let mut ts = [0u8; TIMESTAMP_LEN];
    ts.copy_from_slice(&data[1..1 + TIMESTAMP_LEN]);
    Some(u64::from_be_bytes(ts))
}

fn split_key(key: &DerivedKey) -> (&[u8], &[u8]) {
    key.as_bytes().split_at(16)
}
