//! Master secret handling and PBKDF2 key derivation.

use std::fmt;

use base64::{
    alphabet,
    engine::{general_purpose::URL_SAFE, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use common::KeyDerivationError;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Byte length of a derived key (32 bytes = 256 bits).
pub const DERIVED_KEY_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 rounds. Changing this changes every derived key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// base64url that accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Standard alphabet, padding checked by the caller, leftover bits dropped.
const STANDARD_FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Deployment-wide root key material.
///
/// Never persisted and never printed. The buffer is zeroed on drop.
pub struct MasterSecret(Zeroizing<Vec<u8>>);

impl MasterSecret {
    /// Wrap raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyDerivationError::EmptySecret`] if `bytes` is empty.
    pub fn new(bytes: Vec<u8>) -> Result<Self, KeyDerivationError> {
        if bytes.is_empty() {
            return Err(KeyDerivationError::EmptySecret);
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    /// Interpret a configured secret string.
    ///
    /// Deployments written before this crate existed derived their keys from
    /// whatever a forgiving base64url decoder made of the configured string,
    /// so the same rules apply here: characters outside the base64 alphabet
    /// are skipped, decoding stops at a complete padding run, and the data
    /// must end on a padded boundary. A string that fails those rules (an
    /// unpadded key, say, or most passphrases) is used as raw UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyDerivationError::EmptySecret`] if `text` is empty or
    /// decodes to nothing.
    pub fn parse(text: &str) -> Result<Self, KeyDerivationError> {
        match forgiving_urlsafe_decode(text) {
            Some(decoded) => Self::new(decoded),
            None => Self::new(text.as_bytes().to_vec()),
        }
    }

    /// Generate a fresh random 32-byte secret.
    pub fn generate() -> Self {
        let bytes = Zeroizing::new(super::random_bytes::<DERIVED_KEY_LEN>());
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Padded base64url rendering, suitable for `ENCRYPTION_MASTER_KEY`.
    pub fn to_base64url(&self) -> String {
        URL_SAFE.encode(self.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Decode `text` the way a non-validating base64url decoder does.
///
/// `-` and `_` map to `+` and `/`, every other byte outside the standard
/// alphabet is skipped, `=` only counts once at least two data characters of
/// the current quantum are in, and a complete padding run ends the input.
/// Returns `None` when the data does not end on a quantum boundary.
fn forgiving_urlsafe_decode(text: &str) -> Option<Vec<u8>> {
    let mut data = Zeroizing::new(String::with_capacity(text.len()));
    let mut pads = 0;
    for c in text.chars() {
        let c = match c {
            '-' => '+',
            '_' => '/',
            c => c,
        };
        if c == '=' {
            let quantum = data.len() % 4;
            if quantum >= 2 {
                pads += 1;
                if quantum + pads >= 4 {
                    return STANDARD_FORGIVING.decode(data.as_bytes()).ok();
                }
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '+' || c == '/' {
            data.push(c);
        }
    }
    if data.len() % 4 != 0 {
        return None;
    }
    STANDARD_FORGIVING.decode(data.as_bytes()).ok()
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// Per-identifier symmetric key. Recomputed on demand, never persisted.
#[derive(Clone)]
pub struct DerivedKey(Box<Zeroizing<[u8; DERIVED_KEY_LEN]>>);

impl DerivedKey {
    /// Import raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyDerivationError::InvalidKeyLength`] unless `bytes` is
    /// exactly [`DERIVED_KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyDerivationError> {
        if bytes.len() != DERIVED_KEY_LEN {
            return Err(KeyDerivationError::InvalidKeyLength(bytes.len()));
        }
        let mut buf = Box::new(Zeroizing::new([0u8; DERIVED_KEY_LEN]));
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Import a key in Fernet format (base64url, 32 bytes decoded).
    pub fn from_base64url(encoded: &str) -> Result<Self, KeyDerivationError> {
        let bytes = URL_SAFE_LENIENT
            .decode(encoded)
            .map_err(|_| KeyDerivationError::InvalidEncoding)?;
        Self::from_bytes(&bytes)
    }

    /// Padded base64url rendering (the Fernet key format).
    pub fn to_base64url(&self) -> String {
        URL_SAFE.encode(&self.0[..])
    }

    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        // Equality is for tests and cache checks, not on an attacker-facing path.
        self.0[..] == other.0[..]
    }
}

impl Eq for DerivedKey {}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive the key for `identifier` from `master_secret`.
///
/// PBKDF2-HMAC-SHA256 with the UTF-8 identifier as salt and
/// [`PBKDF2_ITERATIONS`] rounds. Pure and deterministic: identical inputs
/// always yield the identical key, which is what lets previously written
/// envelopes be opened later.
///
/// This is deliberately slow; derive once per logical operation.
///
/// # Errors
///
/// Returns [`KeyDerivationError::EmptyIdentifier`] or
/// [`KeyDerivationError::EmptySecret`] on empty input.
pub fn derive_key(identifier: &str, master_secret: &[u8]) -> Result<DerivedKey, KeyDerivationError> {
    if identifier.is_empty() {
        return Err(KeyDerivationError::EmptyIdentifier);
    }
    if master_secret.is_empty() {
        return Err(KeyDerivationError::EmptySecret);
    }
    Ok(DerivedKey(Box::new(pbkdf2_sha256(
        master_secret,
        identifier.as_bytes(),
        PBKDF2_ITERATIONS,
    ))))
}

fn pbkdf2_sha256(password: &[u8], salt: &[u8], rounds: u32) -> Zeroizing<[u8; DERIVED_KEY_LEN]> {
    let mut out = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut out[..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    const SCENARIO_SECRET: &str = "B1H0xgRBN7ERpLlOiqnJDf_h3FzuJuFQcaqdv4Y7zds=";

    #[test]
    fn pbkdf2_matches_rfc7914_vector() {
        // RFC 7914 §11: P="passwd", S="salt", c=1 (first 32 bytes of dkLen=64).
        let out = pbkdf2_sha256(b"passwd", b"salt", 1);
        let expected = [
            0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16, 0x91, 0xc2, 0x25, 0x44,
            0xb6, 0x05, 0xf9, 0x41, 0x85, 0x21, 0x6d, 0xde, 0x04, 0x65, 0xe6, 0x8b, 0x9d, 0x57,
            0xc2, 0x0d, 0xac, 0xbc,
        ];
        assert_eq!(*out, expected);
    }

    #[test]
    fn derivation_is_deterministic() {
        let secret = MasterSecret::parse(SCENARIO_SECRET).unwrap();
        let a = derive_key("default_user", secret.as_bytes()).unwrap();
        let b = derive_key("default_user", secret.as_bytes()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_base64url(), b.to_base64url());
    }

    #[test]
    fn identifiers_are_isolated() {
        let secret = MasterSecret::parse(SCENARIO_SECRET).unwrap();
        let alice = derive_key("alice", secret.as_bytes()).unwrap();
        let bob = derive_key("bob", secret.as_bytes()).unwrap();
        assert_ne!(alice, bob);
    }

    #[test]
    fn empty_inputs_rejected() {
        assert_eq!(
            derive_key("", b"secret").unwrap_err(),
            KeyDerivationError::EmptyIdentifier
        );
        assert_eq!(
            derive_key("default_user", b"").unwrap_err(),
            KeyDerivationError::EmptySecret
        );
    }

    #[test]
    fn base64url_secret_is_decoded() {
        let secret = MasterSecret::parse(SCENARIO_SECRET).unwrap();
        assert_eq!(secret.as_bytes().len(), 32);
        assert_eq!(secret.to_base64url(), SCENARIO_SECRET);
    }

    #[test]
    fn known_answer_for_default_user() {
        let secret = MasterSecret::parse(SCENARIO_SECRET).unwrap();
        let key = derive_key("default_user", secret.as_bytes()).unwrap();
        assert_eq!(
            key.to_base64url(),
            "-Of7IQdtawwTu4Lhird7PzLbQ9L1mgKrYIP1umMIvGI="
        );
    }

    #[test]
    fn unpadded_secret_is_used_raw() {
        let unpadded = SCENARIO_SECRET.trim_end_matches('=');
        let secret = MasterSecret::parse(unpadded).unwrap();
        assert_eq!(secret.as_bytes().len(), 43);
        assert_eq!(secret.as_bytes(), unpadded.as_bytes());
    }

    #[test]
    fn non_alphabet_characters_are_skipped() {
        // "my secret keys" decodes as "mysecretkeys".
        let secret = MasterSecret::parse("my secret keys").unwrap();
        assert_eq!(secret.as_bytes().len(), 9);
        assert_eq!(
            secret.as_bytes(),
            base64::engine::general_purpose::STANDARD
                .decode("mysecretkeys")
                .unwrap()
        );
    }

    #[test]
    fn decoding_stops_at_padding() {
        let secret = MasterSecret::parse("YQ==ZZZZ").unwrap();
        assert_eq!(secret.as_bytes(), b"a");
        let short = MasterSecret::parse("YWI=ZZZZ").unwrap();
        assert_eq!(short.as_bytes(), b"ab");
    }

    #[test]
    fn dangling_quantum_falls_back_to_raw() {
        // 25 alphabet characters: one past a quantum boundary.
        let secret = MasterSecret::parse("correct horse battery staple").unwrap();
        assert_eq!(secret.as_bytes(), b"correct horse battery staple");
        let short_pad = MasterSecret::parse("YWJjZA=").unwrap();
        assert_eq!(short_pad.as_bytes(), b"YWJjZA=");
    }

    #[test]
    fn secret_decoding_to_nothing_is_rejected() {
        assert_eq!(
            MasterSecret::parse("!!!!").unwrap_err(),
            KeyDerivationError::EmptySecret
        );
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(MasterSecret::parse("").is_err());
        assert!(MasterSecret::new(Vec::new()).is_err());
    }

    #[test]
    fn generated_secret_round_trips_through_text() {
        let secret = MasterSecret::generate();
        let text = secret.to_base64url();
        assert_eq!(text.len(), 44);
        assert_eq!(MasterSecret::parse(&text).unwrap().as_bytes(), secret.as_bytes());
    }

    #[test]
    fn derived_key_import_checks_length() {
        assert_eq!(
            DerivedKey::from_bytes(&[0u8; 16]).unwrap_err(),
            KeyDerivationError::InvalidKeyLength(16)
        );
        assert_eq!(
            DerivedKey::from_base64url("!!!").unwrap_err(),
            KeyDerivationError::InvalidEncoding
        );
        let key = DerivedKey::from_bytes(&[7u8; 32]).unwrap();
        assert_eq!(DerivedKey::from_base64url(&key.to_base64url()).unwrap(), key);
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let secret = MasterSecret::parse("hunter2hunter2").unwrap();
        assert!(format!("{secret:?}").contains("REDACTED"));
        let key = DerivedKey::from_bytes(&[1u8; 32]).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
