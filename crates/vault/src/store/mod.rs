//! Raw content stores.
//!
//! A store holds the *stored* text of each page's content field: either an
//! `ENC:`-tagged envelope or legacy plaintext. Stores never encrypt or
//! decrypt page values; that is the job of
//! [`PageRepository`](crate::repository::PageRepository) and the
//! [`migrate`](crate::migrate) procedure. [`JsonFileStore`] can unwrap a
//! whole-document envelope when it is opened.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use common::{PageKey, StoreError};

/// Key/value access to page content fields.
#[cfg_attr(test, mockall::automock)]
pub trait ContentStore {
    /// Every page key currently in the store, in a stable order.
    fn keys(&self) -> Result<Vec<PageKey>, StoreError>;

    /// The stored text at `key`, or `None` if the page does not exist.
    fn read(&self, key: &PageKey) -> Result<Option<String>, StoreError>;

    /// Overwrite the stored text at `key`.
    ///
    /// # Errors
    ///
    /// Stores that only rewrite existing pages return
    /// [`StoreError::UnknownPage`] for a key they do not hold.
    fn write(&mut self, key: &PageKey, value: &str) -> Result<(), StoreError>;
}
