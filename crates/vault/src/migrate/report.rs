//! Per-value outcomes of a re-key run.

use std::fmt;

use common::PageKey;
use serde::Serialize;

/// Where a migrated value's plaintext came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Tagged envelope opened with the old key.
    OldKey,
    /// Tagged envelope already under the new key (re-run).
    NewKey,
    /// Untagged envelope text opened with the old key.
    BareEnvelope,
    /// Untagged plaintext.
    LegacyPlaintext,
}

/// How the notebook document itself was stored when the run opened it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DocumentSource {
    /// Notebook JSON with per-value content.
    #[default]
    Json,
    /// One envelope around the whole document, opened with `key`.
    Sealed { key: ContentSource },
}

/// Step at which a value failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Read,
    Encrypt,
    Write,
    Verify,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Read => "read",
            FailureStage::Encrypt => "encrypt",
            FailureStage::Write => "write",
            FailureStage::Verify => "verify",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValueStatus {
    /// Re-encrypted under the new key and verified.
    Migrated { source: ContentSource },
    /// Readable; a real run would migrate it.
    WouldMigrate { source: ContentSource },
    /// Empty content, left untouched.
    Empty,
    /// Left untouched (read) or possibly rewritten but unverified (later stages).
    Failed { stage: FailureStage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueOutcome {
    pub key: PageKey,
    #[serde(flatten)]
    pub status: ValueStatus,
}

/// Summary of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub document: DocumentSource,
    pub outcomes: Vec<ValueOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationCounts {
    pub migrated: usize,
    pub would_migrate: usize,
    pub empty: usize,
    pub failed: usize,
}

impl MigrationReport {
    pub fn counts(&self) -> MigrationCounts {
        let mut counts = MigrationCounts::default();
        for outcome in &self.outcomes {
            match outcome.status {
                ValueStatus::Migrated { .. } => counts.migrated += 1,
                ValueStatus::WouldMigrate { .. } => counts.would_migrate += 1,
                ValueStatus::Empty => counts.empty += 1,
                ValueStatus::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    /// Outcomes that failed, in store order.
    pub fn failures(&self) -> impl Iterator<Item = &ValueOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ValueStatus::Failed { .. }))
    }

    /// `true` when no value failed.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn status_of(&self, key: &PageKey) -> Option<&ValueStatus> {
        self.outcomes
            .iter()
            .find(|o| &o.key == key)
            .map(|o| &o.status)
    }
}

impl fmt::Display for MigrationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migrated={} would_migrate={} empty={} failed={}",
            self.migrated, self.would_migrate, self.empty, self.failed
        )
    }
}
