//! In-memory [`ContentStore`], used by tests and by callers that manage
//! persistence themselves.

use std::collections::BTreeMap;

use common::{PageKey, StoreError};

use super::ContentStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    values: BTreeMap<PageKey, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value directly, bypassing any cipher.
    pub fn insert(&mut self, key: PageKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: &PageKey) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(PageKey, String)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (PageKey, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl ContentStore for MemoryStore {
    fn keys(&self) -> Result<Vec<PageKey>, StoreError> {
        Ok(self.values.keys().cloned().collect())
    }

    fn read(&self, key: &PageKey) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &PageKey, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.clone(), value.to_owned());
        Ok(())
    }
}
