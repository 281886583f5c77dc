//! [`ContentStore`] over the legacy `notebooks.json` document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use common::model::NotebookTree;
use common::{PageKey, StoreError};
use tracing::{debug, info};

use super::ContentStore;
use crate::crypto::{envelope, DerivedKey};

/// The whole notebook tree, loaded into memory and rewritten on every write.
///
/// Writes go to a sibling temp file which is then renamed over the original,
/// so a crash mid-write leaves either the old or the new document.
///
/// A store opened from a sealed document (the whole file one token) holds
/// writes in memory; the file changes only on an explicit [`save`](Self::save),
/// which writes notebook JSON.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    tree: NotebookTree,
    sealed_by: Option<usize>,
}

impl JsonFileStore {
    /// Load the document at `path`. A missing file is an empty tree.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file exists but cannot be read,
    /// [`StoreError::Json`] if it is not a notebook document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_sealed(path, &[])
    }

    /// Load the document at `path`, which may be notebook JSON or a single
    /// envelope wrapping it. Each of `keys` is tried in order on a sealed
    /// document; [`sealed_by`](Self::sealed_by) reports which one opened it.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open), plus [`StoreError::SealedDocument`] when the
    /// file is a well-formed envelope that none of `keys` opens.
    pub fn open_sealed(path: impl Into<PathBuf>, keys: &[&DerivedKey]) -> Result<Self, StoreError> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "notebook file not found, starting empty");
                return Ok(Self::with_tree(path, NotebookTree::new()));
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::with_tree(path, NotebookTree::new()));
        }

        let json_err = match serde_json::from_slice(&bytes) {
            Ok(tree) => return Ok(Self::with_tree(path, tree)),
            Err(e) => e,
        };
        let token = std::str::from_utf8(&bytes).map(str::trim).unwrap_or_default();
        if !envelope::is_well_formed(token.as_bytes()) {
            return Err(json_err.into());
        }
        for (index, key) in keys.iter().enumerate() {
            if let Ok(plaintext) = envelope::open(token.as_bytes(), key) {
                let tree = serde_json::from_slice(&plaintext)?;
                info!(path = %path.display(), key_index = index, "opened sealed notebook document");
                return Ok(Self {
                    path,
                    tree,
                    sealed_by: Some(index),
                });
            }
        }
        Err(StoreError::SealedDocument)
    }

    /// Wrap an existing tree; nothing is written until the first `write` or `save`.
    pub fn with_tree(path: impl Into<PathBuf>, tree: NotebookTree) -> Self {
        Self {
            path: path.into(),
            tree,
            sealed_by: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tree(&self) -> &NotebookTree {
        &self.tree
    }

    /// Index of the key that opened a sealed document, `None` for plain JSON.
    pub fn sealed_by(&self) -> Option<usize> {
        self.sealed_by
    }

    /// Persist the current tree.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] on any filesystem failure.
    pub fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.tree)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "notebooks.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn content_mut(&mut self, key: &PageKey) -> Option<&mut String> {
        self.tree
            .get_mut(&key.notebook)?
            .sections
            .get_mut(&key.section)?
            .pages
            .get_mut(&key.page)
            .map(|p| &mut p.content)
    }
}

impl ContentStore for JsonFileStore {
    fn keys(&self) -> Result<Vec<PageKey>, StoreError> {
        let mut keys = Vec::new();
        for (nb_id, notebook) in &self.tree {
            for (sec_id, section) in &notebook.sections {
                for page_id in section.pages.keys() {
                    keys.push(PageKey::new(nb_id, sec_id, page_id));
                }
            }
        }
        Ok(keys)
    }

    fn read(&self, key: &PageKey) -> Result<Option<String>, StoreError> {
        Ok(self
            .tree
            .get(&key.notebook)
            .and_then(|nb| nb.sections.get(&key.section))
            .and_then(|sec| sec.pages.get(&key.page))
            .map(|page| page.content.clone()))
    }

    fn write(&mut self, key: &PageKey, value: &str) -> Result<(), StoreError> {
        let slot = self
            .content_mut(key)
            .ok_or_else(|| StoreError::UnknownPage(key.to_string()))?;
        let previous = std::mem::replace(slot, value.to_owned());
        if self.sealed_by.is_some() {
            return Ok(());
        }

        if let Err(e) = self.save() {
            // Keep memory in step with disk.
            if let Some(slot) = self.content_mut(key) {
                *slot = previous;
            }
            return Err(e);
        }
        Ok(())
    }
}
