//! Reference implementations of the tag query and view store collaborators.
//!
//! [`SqliteCatalog`] persists dimensions, files, tags and views in a single
//! SQLite database. [`MemoryCatalog`] keeps the same data in memory for tests
//! and simulation. Both implement [`Catalog`], the write side the engine
//! itself never needs.

use std::path::{Path, PathBuf};

use linkview_core::{StoreError, TagQuery, TagSelector, ViewStore};

mod memory;
mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

/// A tag dimension such as "Genre" or "Format".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub id: i64,
    pub name: String,
}

/// Everything the catalog knows about one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub workspace_id: String,
    pub path: PathBuf,
    pub display_name: Option<String>,
    /// Only eligible (analyzed) files are ever projected.
    pub eligible: bool,
    /// Sorted by dimension id, then value.
    pub tags: Vec<TagSelector>,
}

impl FileRecord {
    /// True if every selector of `prefix` is among this file's tags.
    pub fn qualifies(&self, prefix: &[TagSelector]) -> bool {
        prefix
            .iter()
            .all(|wanted| self.tags.iter().any(|t| t.matches(wanted)))
    }
}

/// Write access to the tag catalog.
pub trait Catalog: TagQuery + ViewStore {
    /// Create a dimension, or return the existing one with that name.
    fn add_dimension(&self, name: &str) -> Result<Dimension, StoreError>;

    fn dimensions(&self) -> Result<Vec<Dimension>, StoreError>;

    /// Register a file and return its id.
    fn add_file(
        &self,
        workspace_id: &str,
        path: &Path,
        display_name: Option<&str>,
    ) -> Result<String, StoreError>;

    fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError>;

    /// All files of a workspace, ordered by id.
    fn list_files(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError>;

    fn tag_file(&self, file_id: &str, dimension_id: i64, value: &str) -> Result<(), StoreError>;

    /// Remove every value of `dimension_id` from the file. Returns how many were removed.
    fn untag_file(&self, file_id: &str, dimension_id: i64) -> Result<usize, StoreError>;

    fn set_path(&self, file_id: &str, path: &Path) -> Result<(), StoreError>;

    fn set_eligible(&self, file_id: &str, eligible: bool) -> Result<(), StoreError>;

    /// Forget a file and its tags. Returns true if it existed.
    fn remove_file(&self, file_id: &str) -> Result<bool, StoreError>;

    /// Resolve `dimension=value` into a selector.
    fn selector(&self, dimension: &str, value: &str) -> Result<TagSelector, StoreError> {
        let dim = self
            .dimensions()?
            .into_iter()
            .find(|d| d.name == dimension)
            .ok_or_else(|| StoreError::NotFound(format!("dimension '{}'", dimension)))?;
        Ok(TagSelector::new(dim.id, dim.name, value))
    }
}

pub(crate) fn check_tag_value(value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput("tag value must not be empty".to_string()));
    }
    Ok(())
}

pub(crate) fn check_dimension_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() || name.contains('=') {
        return Err(StoreError::InvalidInput(format!(
            "invalid dimension name '{}'",
            name
        )));
    }
    Ok(())
}
