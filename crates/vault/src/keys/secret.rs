//! [`SecretStore`]: shared holder for the optional master secret.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::crypto::MasterSecret;

/// Shared holder for the current master secret.
///
/// Backed by an [`ArcSwapOption`] so that:
/// - `is_configured` and `current` are single atomic loads, cheap enough
///   to run on every encrypt/decrypt call.
/// - A reload can swap in a new secret (or remove it) without blocking
///   readers.
///
/// An empty store is the supported "encryption disabled" mode.
#[derive(Clone, Debug, Default)]
pub struct SecretStore {
    inner: Arc<ArcSwapOption<MasterSecret>>,
}

impl SecretStore {
    /// Create a store holding `secret`.
    pub fn new(secret: Option<MasterSecret>) -> Self {
        Self {
            inner: Arc::new(ArcSwapOption::new(secret.map(Arc::new))),
        }
    }

    /// Create an empty store (encryption disabled).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns `true` if a secret is currently held.
    pub fn is_configured(&self) -> bool {
        self.inner.load().is_some()
    }

    /// Borrow the current secret, if any.
    pub fn current(&self) -> Option<Arc<MasterSecret>> {
        self.inner.load_full()
    }

    /// Store (or replace, or clear) the current secret.
    pub fn replace(&self, secret: Option<MasterSecret>) {
        self.inner.store(secret.map(Arc::new));
    }
}
