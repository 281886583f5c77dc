//! Short-lived in-memory cache of derived keys, keyed by identifier.
//!
//! The cache uses `arc-swap` for lock-free reads on the hot path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use common::KeyDerivationError;

use crate::crypto::{derive_key, DerivedKey, MasterSecret};

/// A single cached entry: the derived key and the secret instance it came from.
#[derive(Debug)]
struct CachedKey {
    secret: Arc<MasterSecret>,
    key: Arc<DerivedKey>,
    derived_at: Instant,
}

impl CachedKey {
    fn is_valid_for(&self, secret: &Arc<MasterSecret>, ttl: Duration) -> bool {
        Arc::ptr_eq(&self.secret, secret) && self.derived_at.elapsed() < ttl
    }
}

/// Shared cache of derived keys.
///
/// Entries are bound to the exact [`MasterSecret`] allocation they were
/// derived from, so swapping the secret invalidates them without any
/// coordination. A zero TTL disables caching entirely.
#[derive(Clone, Debug)]
pub struct KeyCache {
    inner: Arc<ArcSwap<HashMap<String, Arc<CachedKey>>>>,
    ttl: Duration,
}

impl KeyCache {
    /// Create a new, empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(HashMap::new()))),
            ttl,
        }
    }

    /// Return the number of cached entries (including expired ones not yet evicted).
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Return `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Return the key for `identifier` under `secret`, deriving it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates [`KeyDerivationError`] from [`derive_key`].
    pub fn get_or_derive(
        &self,
        identifier: &str,
        secret: &Arc<MasterSecret>,
    ) -> Result<Arc<DerivedKey>, KeyDerivationError> {
        if self.ttl.is_zero() {
            return derive_key(identifier, secret.as_bytes()).map(Arc::new);
        }

        if let Some(entry) = self.inner.load().get(identifier) {
            if entry.is_valid_for(secret, self.ttl) {
                return Ok(entry.key.clone());
            }
        }

        let key = Arc::new(derive_key(identifier, secret.as_bytes())?);
        let entry = Arc::new(CachedKey {
            secret: secret.clone(),
            key: key.clone(),
            derived_at: Instant::now(),
        });
        let ttl = self.ttl;
        self.inner.rcu(|current| {
            let mut next: HashMap<String, Arc<CachedKey>> = current
                .iter()
                .filter(|(_, e)| e.is_valid_for(secret, ttl))
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect();
            next.insert(identifier.to_owned(), entry.clone());
            next
        });
        Ok(key)
    }

    /// Drop every cached key.
    pub fn clear(&self) {
        self.inner.store(Arc::new(HashMap::new()));
    }
}
