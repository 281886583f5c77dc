//! Batch re-key of every stored content value.
//!
//! # Procedure
//!
//! 1. Derive the old and new keys once.
//! 2. Read phase: classify every value. Nothing is written until every value
//!    has been read, so a store failure here leaves the store untouched.
//! 3. Write phase: seal each readable value under the new key and overwrite it.
//! 4. Verify: re-read each rewritten value and open it under the new key.
//!
//! Values are independent: one that cannot be read, written, or verified is
//! reported and the rest of the batch continues. A strict plan instead
//! refuses to write anything when any value is unreadable.
//!
//! A notebook file stored as one envelope around the whole document is
//! handled by [`rekey_file`]: the document is opened with the old (or new)
//! key, its values are migrated in memory, and the file is rewritten once as
//! notebook JSON with per-value envelopes.
//!
//! Not safe under concurrent writers to the same store.

pub mod audit;
pub mod report;

pub use audit::{audit, AuditEntry, AuditReport, AuditState};
pub use report::{
    ContentSource, DocumentSource, FailureStage, MigrationCounts, MigrationReport, ValueOutcome,
    ValueStatus,
};

use std::fmt;
use std::path::PathBuf;

use common::protocol::encode_encrypted;
use common::{DecryptionError, PageKey, StoredValue, UnreadableValueError, VaultError};
use tracing::{info, warn};

use crate::crypto::{derive_key, envelope, Algorithm, DerivedKey, MasterSecret};
use crate::store::{ContentStore, JsonFileStore};

/// Parameters of a re-key run. Keys are always supplied by the caller.
pub struct RekeyPlan {
    old_secret: Option<MasterSecret>,
    new_secret: MasterSecret,
    identifier: String,
    algorithm: Algorithm,
    dry_run: bool,
    strict: bool,
}

impl RekeyPlan {
    /// Plan a run that encrypts everything under `new_secret`.
    ///
    /// Without an old secret this is the "turn encryption on" migration:
    /// untagged values are treated as plaintext.
    pub fn new(new_secret: MasterSecret, identifier: impl Into<String>) -> Self {
        Self {
            old_secret: None,
            new_secret,
            identifier: identifier.into(),
            algorithm: Algorithm::default(),
            dry_run: false,
            strict: false,
        }
    }

    pub fn with_old_secret(mut self, old_secret: MasterSecret) -> Self {
        self.old_secret = Some(old_secret);
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Classify and report without writing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Abort before any write if any value is unreadable.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The new key and, when an old secret is set, the old key.
    fn derive_keys(&self) -> Result<(DerivedKey, Option<DerivedKey>), VaultError> {
        let new_key = derive_key(&self.identifier, self.new_secret.as_bytes())?;
        let old_key = self
            .old_secret
            .as_ref()
            .map(|s| derive_key(&self.identifier, s.as_bytes()))
            .transpose()?;
        Ok((new_key, old_key))
    }
}

impl fmt::Debug for RekeyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RekeyPlan")
            .field("has_old_secret", &self.old_secret.is_some())
            .field("identifier", &self.identifier)
            .field("algorithm", &self.algorithm)
            .field("dry_run", &self.dry_run)
            .field("strict", &self.strict)
            .finish()
    }
}

/// A value that passed the read phase.
struct Pending {
    index: usize,
    plaintext: Vec<u8>,
    source: ContentSource,
}

enum Classified {
    Empty,
    Readable {
        plaintext: Vec<u8>,
        source: ContentSource,
    },
    Unreadable(UnreadableValueError),
}

/// Re-encrypt every value in `store` under the plan's new key.
///
/// # Errors
///
/// - [`VaultError::KeyDerivation`] if either key cannot be derived.
/// - [`VaultError::Store`] if listing or reading fails during the read phase
///   (nothing has been written).
/// - [`VaultError::MigrationAborted`] for a strict plan with unreadable values
///   (nothing has been written).
///
/// Per-value failures are not errors; they are recorded in the report.
pub fn rekey<S>(store: &mut S, plan: &RekeyPlan) -> Result<MigrationReport, VaultError>
where
    S: ContentStore + ?Sized,
{
    let (new_key, old_key) = plan.derive_keys()?;
    run(store, plan, &new_key, old_key.as_ref())
}

/// Re-key the notebook file at `path`, which may be notebook JSON or one
/// envelope around the whole document.
///
/// A sealed document is rewritten as notebook JSON only after every value
/// has been handled, and only when no value failed after the read phase;
/// otherwise the file is left as it was and the values that would have been
/// rewritten are reported as failed writes. A dry run never touches it.
///
/// # Errors
///
/// As [`rekey`], plus [`VaultError::Store`] if the file cannot be opened
/// (including [`StoreError::SealedDocument`](common::StoreError::SealedDocument)
/// when neither key opens a sealed document) or the final save fails.
pub fn rekey_file(path: impl Into<PathBuf>, plan: &RekeyPlan) -> Result<MigrationReport, VaultError> {
    let (new_key, old_key) = plan.derive_keys()?;
    let candidates: Vec<&DerivedKey> = old_key.iter().chain(std::iter::once(&new_key)).collect();
    let mut store = JsonFileStore::open_sealed(path, &candidates)?;

    let document = match store.sealed_by() {
        None => DocumentSource::Json,
        Some(0) if old_key.is_some() => DocumentSource::Sealed {
            key: ContentSource::OldKey,
        },
        Some(_) => DocumentSource::Sealed {
            key: ContentSource::NewKey,
        },
    };
    if let DocumentSource::Sealed { key } = document {
        info!(path = %store.path().display(), key = ?key, "notebook file is a sealed document");
    }

    let mut report = run(&mut store, plan, &new_key, old_key.as_ref())?;
    report.document = document;
    if document == DocumentSource::Json || plan.dry_run {
        return Ok(report);
    }

    let late_failure = report.outcomes.iter().any(|o| {
        matches!(o.status, ValueStatus::Failed { stage, .. } if stage != FailureStage::Read)
    });
    if late_failure {
        warn!(path = %store.path().display(), "sealed document left unchanged");
        for outcome in &mut report.outcomes {
            if matches!(outcome.status, ValueStatus::Migrated { .. }) {
                outcome.status = failed(FailureStage::Write, "sealed document was not rewritten");
            }
        }
        return Ok(report);
    }

    store.save()?;
    info!(path = %store.path().display(), "sealed document rewritten as notebook JSON");
    Ok(report)
}

fn run<S>(
    store: &mut S,
    plan: &RekeyPlan,
    new_key: &DerivedKey,
    old_key: Option<&DerivedKey>,
) -> Result<MigrationReport, VaultError>
where
    S: ContentStore + ?Sized,
{
    // ----- Read phase
    let keys = store.keys()?;
    let mut outcomes = Vec::with_capacity(keys.len());
    let mut pending = Vec::new();
    let mut unreadable = 0usize;

    for key in keys {
        let status = match store.read(&key)? {
            None => {
                unreadable += 1;
                failed(FailureStage::Read, "page disappeared during migration")
            }
            Some(stored) => match classify(&key, &stored, old_key, new_key) {
                Classified::Empty => ValueStatus::Empty,
                Classified::Readable { plaintext, source } => {
                    pending.push(Pending {
                        index: outcomes.len(),
                        plaintext,
                        source,
                    });
                    ValueStatus::WouldMigrate { source }
                }
                Classified::Unreadable(e) => {
                    warn!(page = %key, reason = %e.reason, "value is unreadable; leaving it untouched");
                    unreadable += 1;
                    failed(FailureStage::Read, e.reason)
                }
            },
        };
        outcomes.push(ValueOutcome { key, status });
    }

    if plan.strict && unreadable > 0 {
        warn!(unreadable, "strict migration aborted before writing");
        return Err(VaultError::MigrationAborted { unreadable });
    }

    // ----- Write and verify phases
    if !plan.dry_run {
        for item in pending {
            let key = &outcomes[item.index].key;
            let status = migrate_value(store, key, &item, new_key, plan.algorithm);
            match &status {
                ValueStatus::Migrated { source } => {
                    info!(page = %key, source = ?source, "value migrated");
                }
                ValueStatus::Failed { stage, reason } => {
                    warn!(page = %key, %stage, %reason, "value not migrated");
                }
                _ => {}
            }
            outcomes[item.index].status = status;
        }
    }

    let report = MigrationReport {
        dry_run: plan.dry_run,
        document: DocumentSource::Json,
        outcomes,
    };
    let counts = report.counts();
    info!(
        migrated = counts.migrated,
        would_migrate = counts.would_migrate,
        empty = counts.empty,
        failed = counts.failed,
        dry_run = plan.dry_run,
        "re-key finished"
    );
    Ok(report)
}

fn classify(
    key: &PageKey,
    stored: &str,
    old_key: Option<&DerivedKey>,
    new_key: &DerivedKey,
) -> Classified {
    if stored.is_empty() {
        return Classified::Empty;
    }
    let unreadable = |e: DecryptionError| {
        Classified::Unreadable(UnreadableValueError {
            key: key.to_string(),
            reason: e.to_string(),
        })
    };

    match StoredValue::parse(stored) {
        Err(e) => unreadable(e),
        Ok(StoredValue::Encrypted(env)) => {
            if let Some(Ok(plaintext)) = old_key.map(|k| envelope::open(&env, k)) {
                return Classified::Readable {
                    plaintext,
                    source: ContentSource::OldKey,
                };
            }
            match envelope::open(&env, new_key) {
                Ok(plaintext) => Classified::Readable {
                    plaintext,
                    source: ContentSource::NewKey,
                },
                Err(e) => unreadable(e),
            }
        }
        Ok(StoredValue::Plain(text)) => {
            let bytes = text.as_bytes();
            if !envelope::is_well_formed(bytes) {
                return Classified::Readable {
                    plaintext: bytes.to_vec(),
                    source: ContentSource::LegacyPlaintext,
                };
            }
            // An untagged envelope is never re-sealed as if it were plaintext.
            let opened = old_key
                .into_iter()
                .chain(std::iter::once(new_key))
                .find_map(|k| envelope::open(bytes, k).ok());
            match opened {
                Some(plaintext) => Classified::Readable {
                    plaintext,
                    source: ContentSource::BareEnvelope,
                },
                None => Classified::Unreadable(UnreadableValueError {
                    key: key.to_string(),
                    reason: "untagged envelope that no available key opens".into(),
                }),
            }
        }
    }
}

fn migrate_value<S>(
    store: &mut S,
    key: &PageKey,
    item: &Pending,
    new_key: &DerivedKey,
    algorithm: Algorithm,
) -> ValueStatus
where
    S: ContentStore + ?Sized,
{
    let sealed = match envelope::seal(&item.plaintext, new_key, algorithm) {
        Ok(env) => env,
        Err(e) => return failed(FailureStage::Encrypt, e.to_string()),
    };
    if let Err(e) = store.write(key, &encode_encrypted(&sealed)) {
        return failed(FailureStage::Write, e.to_string());
    }
    match verify_value(store, key, &item.plaintext, new_key) {
        Ok(()) => ValueStatus::Migrated {
            source: item.source,
        },
        Err(reason) => failed(FailureStage::Verify, reason),
    }
}

/// Re-read `key` and check it is tagged, not JSON, and opens to `expected`.
fn verify_value<S>(
    store: &S,
    key: &PageKey,
    expected: &[u8],
    new_key: &DerivedKey,
) -> Result<(), String>
where
    S: ContentStore + ?Sized,
{
    let stored = store
        .read(key)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "page disappeared after write".to_owned())?;
    let env = match StoredValue::parse(&stored).map_err(|e| e.to_string())? {
        StoredValue::Encrypted(env) => env,
        StoredValue::Plain(_) => return Err("stored value is missing the encrypted marker".into()),
    };
    if serde_json::from_slice::<serde_json::Value>(&env).is_ok() {
        return Err("stored envelope parses as plain JSON".into());
    }
    let plaintext = envelope::open(&env, new_key).map_err(|e| e.to_string())?;
    if plaintext != expected {
        return Err("decrypted content does not match the original".into());
    }
    Ok(())
}

fn failed(stage: FailureStage, reason: impl Into<String>) -> ValueStatus {
    ValueStatus::Failed {
        stage,
        reason: reason.into(),
    }
}
