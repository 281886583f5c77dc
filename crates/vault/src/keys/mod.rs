//! Master secret holder and derived-key cache.
//!
//! # Lifecycle
//!
//! 1. At startup the configured secret (if any) is parsed into a
//!    [`MasterSecret`](crate::crypto::MasterSecret) and placed in a
//!    [`SecretStore`].
//! 2. The cipher derives per-identifier keys on demand through [`KeyCache`].
//! 3. Replacing the secret swaps the store atomically; cache entries derived
//!    from the old secret stop matching and are dropped on the next lookup.
//!
//! # Security invariants
//!
//! - Secrets and derived keys are **never** written to disk, logged, or
//!   included in traces.

pub mod cache;
pub mod secret;

pub use cache::KeyCache;
pub use secret::SecretStore;
