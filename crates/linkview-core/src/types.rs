use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::TagChain;

/// Filesystem identity of a file: the `(device, inode)` pair.
///
/// Inode numbers are only unique per device, so the two halves are always
/// compared together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
}

impl FileIdentity {
    pub fn new(device: u64, inode: u64) -> Self {
        FileIdentity { device, inode }
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// Result of a `stat` call on a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub identity: FileIdentity,
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub len: u64,
}

/// One entry returned by `list_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (last path component).
    pub name: String,
    /// Full path of the entry.
    pub path: PathBuf,
    /// Whether this entry is a directory. Symlinks are never directories.
    pub is_dir: bool,
}

/// A root filesystem location whose files can be tagged and projected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Workspace {
            id: id.into(),
            root: root.into(),
        }
    }
}

/// A saved tag-chain filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    /// Parent view, used for grouping only. It never affects link paths.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub chain: TagChain,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ViewDefinition {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        name: impl Into<String>,
        chain: TagChain,
    ) -> Self {
        let now = Utc::now();
        ViewDefinition {
            id: id.into(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            parent_id: None,
            chain,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// A file that satisfies a tag-chain prefix, as reported by the tag query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyingFile {
    pub file_id: String,
    /// Current real path of the source file.
    pub path: PathBuf,
    /// User-assigned alias, preferred over the original name for links.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl QualifyingFile {
    pub fn new(file_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        QualifyingFile {
            file_id: file_id.into(),
            path: path.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name of the hardlink this file gets inside a virtual directory.
    pub fn link_file_name(&self) -> String {
        crate::path::link_file_name(&self.path, self.display_name.as_deref())
    }
}

/// The view that blocks a save under the broader-shadows-narrower rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub blocking_view_id: String,
    pub blocking_view_name: String,
    pub blocking_chain: TagChain,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "view '{}' ({}) already filters by the more specific chain {}",
            self.blocking_view_name, self.blocking_view_id, self.blocking_chain
        )
    }
}
