//! End-to-end scenarios: cipher round trip, disabled mode, and key rotation
//! over a notebook file, including one sealed as a single token.

use std::fs;
use std::time::Duration;

use common::protocol::{is_marked_encrypted, DECRYPT_FAILED_SENTINEL};
use common::{DecryptionError, PageKey};
use vault::crypto::Algorithm;
use vault::keys::{KeyCache, SecretStore};
use vault::crypto::envelope;
use vault::migrate::{ContentSource, DocumentSource, FailureStage, ValueStatus};
use vault::{
    audit, derive_key, rekey, rekey_file, ContentCipher, ContentStore, JsonFileStore,
    MasterSecret, MemoryStore, PageRepository, RekeyPlan,
};

const SECRET: &str = "B1H0xgRBN7ERpLlOiqnJDf_h3FzuJuFQcaqdv4Y7zds=";
const OLD_SECRET: &str = "retired deployment secret";
const ID: &str = "default_user";

fn cipher(secret: Option<&str>) -> ContentCipher {
    ContentCipher::new(
        SecretStore::new(secret.map(|s| MasterSecret::parse(s).unwrap())),
        KeyCache::new(Duration::from_secs(60)),
        Algorithm::Fernet,
    )
}

#[test]
fn hello_todo_round_trip_and_tamper() {
    let cipher = cipher(Some(SECRET));
    let plaintext = "# Hello\n- [ ] todo";

    let env = cipher.encrypt(plaintext.as_bytes(), ID);
    let back = cipher.decrypt(&env, ID).unwrap();
    assert_eq!(String::from_utf8(back).unwrap(), plaintext);

    let mut tampered = env.clone();
    let mid = tampered.len() / 2;
    tampered[mid] = if tampered[mid] == b'A' { b'B' } else { b'A' };
    assert!(cipher.decrypt(&tampered, ID).is_err());
}

#[test]
fn disabled_store_keeps_abc_verbatim() {
    let key = PageKey::new("nb", "sec", "page");
    let mut repo = PageRepository::new(MemoryStore::new(), cipher(None), ID);
    repo.save_content(&key, "abc").unwrap();

    let stored = repo.store().read(&key).unwrap().unwrap();
    assert_eq!(stored, "abc");
    assert!(!is_marked_encrypted(&stored));
}

fn write_corpus(path: &std::path::Path) {
    // Page "a" under the old secret, "b" legacy plaintext, "c" corrupted.
    let old_repo_value = {
        let mut repo = PageRepository::new(MemoryStore::new(), cipher(Some(OLD_SECRET)), ID);
        let k = PageKey::new("x", "y", "z");
        repo.save_content(&k, "alpha under old key").unwrap();
        repo.store().read(&k).unwrap().unwrap()
    };
    let doc = serde_json::json!({
        "work": {
            "name": "Work",
            "created_at": "2024-01-01T00:00:00",
            "sections": {
                "notes": {
                    "name": "Notes",
                    "pages": {
                        "a": { "name": "A", "content": old_repo_value },
                        "b": { "name": "B", "content": "legacy beta" },
                        "c": { "name": "C", "content": "ENC:6741414141" }
                    }
                }
            }
        }
    });
    fs::write(path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
}

#[test]
fn rotation_over_mixed_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notebooks.json");
    write_corpus(&path);

    let a = PageKey::new("work", "notes", "a");
    let b = PageKey::new("work", "notes", "b");
    let c = PageKey::new("work", "notes", "c");

    let mut store = JsonFileStore::open(&path).unwrap();
    let plan = RekeyPlan::new(MasterSecret::parse(SECRET).unwrap(), ID)
        .with_old_secret(MasterSecret::parse(OLD_SECRET).unwrap());
    let report = rekey(&mut store, &plan).unwrap();

    assert_eq!(
        report.status_of(&a),
        Some(&ValueStatus::Migrated { source: ContentSource::OldKey })
    );
    assert_eq!(
        report.status_of(&b),
        Some(&ValueStatus::Migrated { source: ContentSource::LegacyPlaintext })
    );
    assert!(matches!(
        report.status_of(&c),
        Some(ValueStatus::Failed { stage: FailureStage::Read, .. })
    ));
    assert!(!report.is_success());

    // Reload from disk and read through the new secret.
    let repo = PageRepository::new(JsonFileStore::open(&path).unwrap(), cipher(Some(SECRET)), ID);
    assert_eq!(repo.load_content(&a), "alpha under old key");
    assert_eq!(repo.load_content(&b), "legacy beta");
    assert_eq!(repo.store().read(&c).unwrap().as_deref(), Some("ENC:6741414141"));
    assert_eq!(repo.load_content(&c), DECRYPT_FAILED_SENTINEL);

    // The old secret no longer opens anything.
    let old_repo = PageRepository::new(JsonFileStore::open(&path).unwrap(), cipher(Some(OLD_SECRET)), ID);
    assert!(matches!(
        old_repo.read_content(&a),
        Err(common::VaultError::Decryption(DecryptionError::IntegrityCheckFailed))
    ));

    let audit_report = audit(repo.store(), &MasterSecret::parse(SECRET).unwrap(), ID).unwrap();
    let counts = audit_report.counts();
    assert_eq!(counts.encrypted, 2);
    assert_eq!(counts.unreadable, 1);
}

#[test]
fn second_run_changes_nothing_but_nonces() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notebooks.json");
    write_corpus(&path);

    let plan = RekeyPlan::new(MasterSecret::parse(SECRET).unwrap(), ID)
        .with_old_secret(MasterSecret::parse(OLD_SECRET).unwrap());

    let mut store = JsonFileStore::open(&path).unwrap();
    let first = rekey(&mut store, &plan).unwrap();
    let second = rekey(&mut store, &plan).unwrap();

    assert_eq!(first.counts().migrated, 2);
    assert_eq!(second.counts().migrated, 2);
    for key in [PageKey::new("work", "notes", "a"), PageKey::new("work", "notes", "b")] {
        assert_eq!(
            second.status_of(&key),
            Some(&ValueStatus::Migrated { source: ContentSource::NewKey })
        );
    }

    let repo = PageRepository::new(store, cipher(Some(SECRET)), ID);
    assert_eq!(
        repo.load_content(&PageKey::new("work", "notes", "a")),
        "alpha under old key"
    );
}

fn write_sealed_document(path: &std::path::Path, secret: &str) {
    let doc = serde_json::json!({
        "work": {
            "name": "Work",
            "sections": {
                "notes": {
                    "name": "Notes",
                    "pages": {
                        "a": { "name": "A", "content": "# Hello\n- [ ] todo" },
                        "b": { "name": "B", "content": "" }
                    }
                }
            }
        }
    });
    let key = derive_key(ID, MasterSecret::parse(secret).unwrap().as_bytes()).unwrap();
    let token = envelope::seal(&serde_json::to_vec(&doc).unwrap(), &key, Algorithm::Fernet).unwrap();
    fs::write(path, token).unwrap();
}

#[test]
fn sealed_document_is_rekeyed_into_per_page_envelopes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notebooks.json");
    write_sealed_document(&path, OLD_SECRET);
    let sealed_bytes = fs::read(&path).unwrap();

    let plan = || {
        RekeyPlan::new(MasterSecret::parse(SECRET).unwrap(), ID)
            .with_old_secret(MasterSecret::parse(OLD_SECRET).unwrap())
    };

    let preview = rekey_file(&path, &plan().dry_run(true)).unwrap();
    assert_eq!(preview.document, DocumentSource::Sealed { key: ContentSource::OldKey });
    assert_eq!(fs::read(&path).unwrap(), sealed_bytes);

    let report = rekey_file(&path, &plan()).unwrap();
    assert!(report.is_success());
    assert_eq!(report.document, DocumentSource::Sealed { key: ContentSource::OldKey });

    let a = PageKey::new("work", "notes", "a");
    let b = PageKey::new("work", "notes", "b");
    assert_eq!(
        report.status_of(&a),
        Some(&ValueStatus::Migrated { source: ContentSource::LegacyPlaintext })
    );
    assert_eq!(report.status_of(&b), Some(&ValueStatus::Empty));

    // Now plain notebook JSON with a tagged value per page.
    let store = JsonFileStore::open(&path).unwrap();
    assert_eq!(store.sealed_by(), None);
    assert!(is_marked_encrypted(&store.read(&a).unwrap().unwrap()));

    let repo = PageRepository::new(store, cipher(Some(SECRET)), ID);
    assert_eq!(repo.load_content(&a), "# Hello\n- [ ] todo");
    assert!(audit(repo.store(), &MasterSecret::parse(SECRET).unwrap(), ID)
        .unwrap()
        .is_fully_encrypted());
}

#[test]
fn sealed_document_under_unknown_key_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notebooks.json");
    write_sealed_document(&path, "a key nobody has any more");
    let sealed_bytes = fs::read(&path).unwrap();

    let plan = RekeyPlan::new(MasterSecret::parse(SECRET).unwrap(), ID)
        .with_old_secret(MasterSecret::parse(OLD_SECRET).unwrap());
    let err = rekey_file(&path, &plan).unwrap_err();
    assert!(matches!(
        err,
        common::VaultError::Store(common::StoreError::SealedDocument)
    ));
    assert_eq!(fs::read(&path).unwrap(), sealed_bytes);
}
