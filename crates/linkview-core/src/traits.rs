use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::chain::TagSelector;
use crate::error::{FsError, StoreError};
use crate::types::{DirEntry, FileStat, QualifyingFile, ViewDefinition};

/// Filesystem primitives the engine materializes views with.
///
/// Implementations never follow symlinks in `stat`, and `remove` only
/// removes files or empty directories.
#[async_trait]
pub trait Filesystem: Send + Sync + 'static {
    /// Create a directory and all missing parents.
    async fn mkdir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Create `dst` as a new name for the file at `src`.
    async fn hard_link(&self, src: &Path, dst: &Path) -> Result<(), FsError>;

    /// Remove a file or an empty directory.
    async fn remove(&self, path: &Path) -> Result<(), FsError>;

    /// Get identity and type of a path.
    async fn stat(&self, path: &Path) -> Result<FileStat, FsError>;

    /// List the entries of a directory, sorted by name.
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError>;

    /// Create a new file with `content`, failing with `AlreadyExists` if present.
    async fn write_new(&self, path: &Path, content: &[u8]) -> Result<(), FsError>;

    /// Stat that maps "not found" to `None`.
    async fn try_stat(&self, path: &Path) -> Result<Option<FileStat>, FsError> {
        match self.stat(path).await {
            Ok(stat) => Ok(Some(stat)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Answers which files satisfy a tag-chain prefix.
#[async_trait]
pub trait TagQuery: Send + Sync + 'static {
    /// Files of `workspace_id` whose tags satisfy every selector of `prefix`.
    /// An empty prefix returns every eligible file of the workspace.
    async fn list_qualifying_files(
        &self,
        workspace_id: &str,
        prefix: &[TagSelector],
    ) -> Result<Vec<QualifyingFile>, StoreError>;

    /// Look up a single file record by id.
    async fn file(&self, file_id: &str) -> Result<Option<QualifyingFile>, StoreError>;
}

/// CRUD over view definitions keyed by `(workspace_id, view_id)`.
#[async_trait]
pub trait ViewStore: Send + Sync + 'static {
    async fn get_view(&self, workspace_id: &str, view_id: &str) -> Result<Option<ViewDefinition>, StoreError>;

    /// All views of a workspace, oldest `updated_at` first.
    async fn list_views(&self, workspace_id: &str) -> Result<Vec<ViewDefinition>, StoreError>;

    /// Insert or replace a view by id.
    async fn upsert_view(&self, view: &ViewDefinition) -> Result<(), StoreError>;

    /// Returns true if a view was removed.
    async fn delete_view(&self, workspace_id: &str, view_id: &str) -> Result<bool, StoreError>;

    /// Folders, relative to the virtual root, plan output was written to.
    /// The virtual root itself is the empty path.
    async fn plan_dirs(&self, workspace_id: &str) -> Result<Vec<PathBuf>, StoreError>;

    /// Remember folders plan output was written to.
    async fn add_plan_dirs(&self, workspace_id: &str, dirs: &[PathBuf]) -> Result<(), StoreError>;
}
