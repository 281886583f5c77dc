//! Subcommand handlers. Reports go to stdout, logs to stderr.
//!
//! Each handler returns `Ok(true)` on success and `Ok(false)` when the run
//! completed but found values needing attention.

use std::io::{self, Write};

use anyhow::{Context, Result};
use common::VaultError;
use tracing::{error, info, warn};
use vault::migrate::{AuditReport, AuditState, DocumentSource, MigrationReport, ValueStatus};
use vault::{derive_key, Algorithm, JsonFileStore, MasterSecret, RekeyPlan, VaultConfig};

use crate::config::RekeyConfig;

/// Options for the `rekey` subcommand.
#[derive(Debug, Clone, Default)]
pub struct RekeyOptions {
    pub algorithm: Algorithm,
    pub dry_run: bool,
    pub strict: bool,
    pub json: bool,
}

pub fn rekey(
    cfg: &RekeyConfig,
    new_key: &str,
    old_key: Option<&str>,
    opts: &RekeyOptions,
) -> Result<bool> {
    let new_secret = MasterSecret::parse(new_key).context("new key is invalid")?;
    let mut plan = RekeyPlan::new(new_secret, cfg.key_identifier.as_str())
        .algorithm(opts.algorithm)
        .dry_run(opts.dry_run)
        .strict(opts.strict);
    match old_key.filter(|k| !k.is_empty()) {
        Some(old) => {
            plan = plan.with_old_secret(MasterSecret::parse(old).context("old key is invalid")?);
        }
        None => info!("no old key given; untagged values will be encrypted as plaintext"),
    }

    info!(
        path = %cfg.data_file.display(),
        algorithm = %opts.algorithm,
        dry_run = opts.dry_run,
        strict = opts.strict,
        "starting re-key"
    );

    let report = vault::rekey_file(&cfg.data_file, &plan).map_err(|e| log_vault_error("re-key", e))?;

    let mut out = io::stdout().lock();
    if opts.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        write_migration_report(&mut out, &report)?;
    }

    if !report.is_success() {
        warn!(failed = report.counts().failed, "re-key finished with failures");
    }
    Ok(report.is_success())
}

pub fn verify(cfg: &RekeyConfig, key: Option<&str>, json: bool) -> Result<bool> {
    let secret = match key {
        Some(key) => MasterSecret::parse(key).context("key is invalid")?,
        None => VaultConfig::from_env()?
            .master_secret()?
            .context("no key given and ENCRYPTION_MASTER_KEY is not configured")?,
    };
    let key = derive_key(&cfg.key_identifier, secret.as_bytes()).context("key derivation failed")?;
    let store = JsonFileStore::open_sealed(&cfg.data_file, &[&key])
        .with_context(|| format!("failed to open notebook file {}", cfg.data_file.display()))?;
    if store.sealed_by().is_some() {
        warn!(path = %cfg.data_file.display(), "notebook file is a sealed document; run rekey to convert it");
    }

    let report = vault::audit(&store, &secret, &cfg.key_identifier)
        .map_err(|e| log_vault_error("verify", e))?;

    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        write_audit_report(&mut out, &report)?;
    }

    Ok(report.is_fully_encrypted())
}

pub fn generate_key() -> Result<bool> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", MasterSecret::generate().to_base64url())?;
    Ok(true)
}

fn log_vault_error(op: &str, e: VaultError) -> anyhow::Error {
    error!(policy = ?e.policy(), error = %e, "{op} failed");
    anyhow::Error::new(e).context(format!("{op} failed"))
}

pub(crate) fn write_migration_report(out: &mut impl Write, report: &MigrationReport) -> io::Result<()> {
    if let DocumentSource::Sealed { key } = report.document {
        writeln!(out, "sealed document opened ({key:?})")?;
    }
    for outcome in &report.outcomes {
        match &outcome.status {
            ValueStatus::Migrated { source } => {
                writeln!(out, "migrated       {}  ({source:?})", outcome.key)?
            }
            ValueStatus::WouldMigrate { source } => {
                writeln!(out, "would migrate  {}  ({source:?})", outcome.key)?
            }
            ValueStatus::Empty => writeln!(out, "empty          {}", outcome.key)?,
            ValueStatus::Failed { stage, reason } => {
                writeln!(out, "FAILED         {}  [{stage}] {reason}", outcome.key)?
            }
        }
    }
    let prefix = if report.dry_run { "dry run: " } else { "" };
    writeln!(out, "{prefix}{}", report.counts())
}

pub(crate) fn write_audit_report(out: &mut impl Write, report: &AuditReport) -> io::Result<()> {
    for entry in &report.entries {
        match &entry.state {
            AuditState::Encrypted { algorithm, .. } => {
                writeln!(out, "encrypted   {}  ({algorithm})", entry.key)?
            }
            AuditState::Plaintext => writeln!(out, "PLAINTEXT   {}", entry.key)?,
            AuditState::Empty => writeln!(out, "empty       {}", entry.key)?,
            AuditState::Unreadable { reason } => {
                writeln!(out, "UNREADABLE  {}  {reason}", entry.key)?
            }
        }
    }
    let c = report.counts();
    writeln!(
        out,
        "encrypted={} plaintext={} empty={} unreadable={}",
        c.encrypted, c.plaintext, c.empty, c.unreadable
    )
}
