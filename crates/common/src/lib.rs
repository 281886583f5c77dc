//! Common types, the stored-value protocol, and errors shared across `notevault` crates.

pub mod error;
pub mod model;
pub mod protocol;

pub use error::{
    DecryptionError, EncryptionError, FailurePolicy, KeyDerivationError, StoreError,
    UnreadableValueError, VaultError,
};
pub use model::PageKey;
pub use protocol::StoredValue;
