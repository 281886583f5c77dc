//! Read-only classification of a store under one key.

use common::{PageKey, StoredValue, VaultError};
use serde::Serialize;

use crate::crypto::{derive_key, envelope, fernet, Algorithm, MasterSecret};
use crate::store::ContentStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuditState {
    /// Tagged and opens under the audited key.
    Encrypted {
        algorithm: Algorithm,
        /// Fernet token timestamp (Unix seconds), when the format carries one.
        #[serde(skip_serializing_if = "Option::is_none")]
        encrypted_at: Option<u64>,
    },
    /// Untagged text.
    Plaintext,
    Empty,
    /// Cannot be opened under the audited key, or an envelope missing its tag.
    Unreadable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub key: PageKey,
    #[serde(flatten)]
    pub state: AuditState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditCounts {
    pub encrypted: usize,
    pub plaintext: usize,
    pub empty: usize,
    pub unreadable: usize,
}

impl AuditReport {
    pub fn counts(&self) -> AuditCounts {
        let mut counts = AuditCounts::default();
        for entry in &self.entries {
            match entry.state {
                AuditState::Encrypted { .. } => counts.encrypted += 1,
                AuditState::Plaintext => counts.plaintext += 1,
                AuditState::Empty => counts.empty += 1,
                AuditState::Unreadable { .. } => counts.unreadable += 1,
            }
        }
        counts
    }

    /// `true` when every non-empty value is encrypted under the audited key.
    pub fn is_fully_encrypted(&self) -> bool {
        let c = self.counts();
        c.plaintext == 0 && c.unreadable == 0
    }
}

/// Classify every value in `store` against the key derived from `secret`.
///
/// # Errors
///
/// [`VaultError::KeyDerivation`] for an empty identifier, [`VaultError::Store`]
/// if the store cannot be listed or read.
pub fn audit<S>(store: &S, secret: &MasterSecret, identifier: &str) -> Result<AuditReport, VaultError>
where
    S: ContentStore + ?Sized,
{
    let key = derive_key(identifier, secret.as_bytes())?;
    let mut entries = Vec::new();

    for page in store.keys()? {
        let stored = store.read(&page)?.unwrap_or_default();
        let state = if stored.is_empty() {
            AuditState::Empty
        } else {
            match StoredValue::parse(&stored) {
                Ok(StoredValue::Plain(text)) if envelope::is_well_formed(text.as_bytes()) => {
                    AuditState::Unreadable {
                        reason: "untagged envelope".into(),
                    }
                }
                Ok(StoredValue::Plain(_)) => AuditState::Plaintext,
                Ok(StoredValue::Encrypted(env)) => match envelope::open(&env, &key) {
                    Ok(_) => AuditState::Encrypted {
                        algorithm: Algorithm::detect(&env).unwrap_or_default(),
                        encrypted_at: fernet::timestamp(&env),
                    },
                    Err(e) => AuditState::Unreadable {
                        reason: e.to_string(),
                    },
                },
                Err(e) => AuditState::Unreadable {
                    reason: e.to_string(),
                },
            }
        };
        entries.push(AuditEntry { key: page, state });
    }

    Ok(AuditReport { entries })
}
