//! Encryption at rest for notebook page content.
//!
//! - [`crypto`]: key derivation and envelope formats.
//! - [`keys`]: the shared master secret and derived-key cache.
//! - [`content::ContentCipher`]: encrypt/decrypt entry point, fail-open on write.
//! - [`repository::PageRepository`]: the `ENC:` storage convention and read sentinels.
//! - [`migrate`]: batch re-key and audit.

pub mod config;
pub mod content;
pub mod crypto;
pub mod keys;
pub mod migrate;
pub mod repository;
pub mod store;

pub use config::VaultConfig;
pub use content::ContentCipher;
pub use crypto::{derive_key, Algorithm, DerivedKey, MasterSecret};
pub use migrate::{audit, rekey, rekey_file, AuditReport, MigrationReport, RekeyPlan};
pub use repository::PageRepository;
pub use store::{ContentStore, JsonFileStore, MemoryStore};
