//! Read-only in-memory data shared by every variant.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const EMBEDDED_LIBRARY: &str = include_str!("../data/library.yaml");

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub title: String,
    pub author_id: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

/// The books and authors tables. Iteration order is ascending by key, which
/// is the order `books` and `authors` return their records in.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Library {
    #[serde(default)]
    books: BTreeMap<i32, Book>,
    #[serde(default)]
    authors: BTreeMap<i32, Author>,
}

impl Library {
    /// The fixture compiled into the binary.
    pub fn embedded() -> Result<Self, StoreError> {
        Self::from_yaml(EMBEDDED_LIBRARY)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, StoreError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        tracing::debug!("Reading library data from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    pub fn authors(&self) -> impl Iterator<Item = &Author> {
        self.authors.values()
    }

    pub fn author(&self, id: i32) -> Option<&Author> {
        self.authors.get(&id)
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
}
