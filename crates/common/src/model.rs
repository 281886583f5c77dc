//! Notebook → Section → Page hierarchy.
//!
//! The serialised form matches the legacy `notebooks.json` document: nested
//! maps keyed by slug ids, with the page body in `content`. Fields this crate
//! does not know about are carried through in `extra` so a rewrite never
//! drops them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Whole document: notebook id → notebook.
pub type NotebookTree = BTreeMap<String, Notebook>;

/// Address of a single page's content field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub notebook: String,
    pub section: String,
    pub page: String,
}

impl PageKey {
    pub fn new(
        notebook: impl Into<String>,
        section: impl Into<String>,
        page: impl Into<String>,
    ) -> Self {
        Self {
            notebook: notebook.into(),
            section: section.into(),
            page: page.into(),
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.notebook, self.section, self.page)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub name: String,
    #[serde(default)]
    pub sections: BTreeMap<String, Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Notebook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: BTreeMap::new(),
            created_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    #[serde(default)]
    pub pages: BTreeMap<String, Page>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pages: BTreeMap::new(),
            created_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A page. `content` holds the stored representation (plaintext or an
/// `ENC:`-tagged envelope), never decrypted text unless encryption is off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Page {
    /// A freshly created page: content starts empty.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: String::new(),
            created_at: None,
            updated_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_key_display() {
        let key = PageKey::new("work", "meetings", "standup");
        assert_eq!(key.to_string(), "work/meetings/standup");
    }

    #[test]
    fn legacy_document_parses_and_keeps_unknown_fields() {
        let doc = r##"{
          "work": {
            "name": "Work",
            "created_at": "2024-01-02T03:04:05",
            "color": "blue",
            "sections": {
              "meetings": {
                "name": "Meetings",
                "pages": {
                  "standup": {
                    "name": "Standup",
                    "content": "# Notes",
                    "updated_at": "2024-01-03T00:00:00"
                  }
                }
              }
            }
          }
        }"##;
        let tree: NotebookTree = serde_json::from_str(doc).unwrap();
        let nb = &tree["work"];
        assert_eq!(nb.extra["color"], "blue");
        let page = &nb.sections["meetings"].pages["standup"];
        assert_eq!(page.content, "# Notes");
        assert_eq!(page.created_at, None);

        let out = serde_json::to_value(&tree).unwrap();
        assert_eq!(out["work"]["color"], "blue");
        assert_eq!(
            out["work"]["sections"]["meetings"]["pages"]["standup"]["updated_at"],
            "2024-01-03T00:00:00"
        );
    }

    #[test]
    fn new_page_is_empty() {
        assert!(Page::new("Scratch").content.is_empty());
    }
}
