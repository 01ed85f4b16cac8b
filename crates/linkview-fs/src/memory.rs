use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use linkview_core::{DirEntry, FileIdentity, FileStat, Filesystem, FsError};

const ROOT_DEVICE: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Dir,
    File,
    Symlink,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    kind: Kind,
    identity: FileIdentity,
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    contents: HashMap<FileIdentity, Vec<u8>>,
    /// Mount points, checked longest first.
    mounts: Vec<(PathBuf, u64)>,
    read_only: Vec<PathBuf>,
    next_inode: u64,
}

impl State {
    fn device_of(&self, path: &Path) -> u64 {
        self.mounts
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map(|(_, device)| *device)
            .unwrap_or(ROOT_DEVICE)
    }

    fn allocate(&mut self, path: &Path) -> FileIdentity {
        self.next_inode += 1;
        FileIdentity::new(self.device_of(path), self.next_inode)
    }

    fn check_writable(&self, path: &Path) -> Result<(), FsError> {
        if self.read_only.iter().any(|p| path.starts_with(p)) {
            return Err(FsError::PermissionDenied(path.to_path_buf()));
        }
        Ok(())
    }

    /// The parent of `path` must exist and be a directory.
    fn check_parent(&self, path: &Path) -> Result<(), FsError> {
        let parent = path
            .parent()
            .ok_or_else(|| FsError::Other(format!("no parent: {}", path.display())))?;
        match self.nodes.get(parent) {
            Some(node) if node.kind == Kind::Dir => Ok(()),
            Some(_) => Err(not_a_directory(parent)),
            None => Err(FsError::NotFound(path.to_path_buf())),
        }
    }

    fn has_children(&self, dir: &Path) -> bool {
        self.nodes
            .range(dir.to_path_buf()..)
            .skip(1)
            .take_while(|(p, _)| p.starts_with(dir))
            .next()
            .is_some()
    }

    fn unlink(&mut self, path: &Path) -> Option<Node> {
        let node = self.nodes.remove(path)?;
        if node.kind != Kind::Dir && !self.nodes.values().any(|n| n.identity == node.identity) {
            self.contents.remove(&node.identity);
        }
        Some(node)
    }

    fn mkdir_all(&mut self, path: &Path) -> Result<(), FsError> {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            match self.nodes.get(&current) {
                Some(node) if node.kind == Kind::Dir => {}
                Some(_) => return Err(FsError::AlreadyExists(current)),
                None => {
                    self.check_writable(&current)?;
                    let identity = self.allocate(&current);
                    self.nodes.insert(
                        current.clone(),
                        Node {
                            kind: Kind::Dir,
                            identity,
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

fn not_a_directory(path: &Path) -> FsError {
    FsError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(ErrorKind::Other, "not a directory"),
    }
}

fn normalize(path: &Path) -> Result<PathBuf, FsError> {
    if !path.is_absolute() {
        return Err(FsError::Other(format!(
            "memory filesystem needs absolute paths: {}",
            path.display()
        )));
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// In-memory filesystem with real hardlink semantics, for tests and simulation.
///
/// Every file has a `(device, inode)` identity; hardlinks share it. Paths
/// below a [`mount`](MemoryFs::mount) point belong to another device, so
/// linking across them fails with `CrossDevice` and moving a file across them
/// gives it a new identity, just like `mv` between filesystems.
#[derive(Debug)]
pub struct MemoryFs {
    state: RwLock<State>,
}

impl MemoryFs {
    /// Create a filesystem containing only `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            PathBuf::from("/"),
            Node {
                kind: Kind::Dir,
                identity: FileIdentity::new(ROOT_DEVICE, 1),
            },
        );
        MemoryFs {
            state: RwLock::new(State {
                nodes,
                contents: HashMap::new(),
                mounts: Vec::new(),
                read_only: Vec::new(),
                next_inode: 1,
            }),
        }
    }

    /// Treat everything below `prefix` as living on `device`.
    pub fn mount(&self, prefix: impl AsRef<Path>, device: u64) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.mounts.push((prefix.as_ref().to_path_buf(), device));
        state
            .mounts
            .sort_by(|a, b| b.0.components().count().cmp(&a.0.components().count()));
    }

    /// Refuse every mutation below `prefix` with `PermissionDenied`.
    pub fn set_read_only(&self, prefix: impl AsRef<Path>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.read_only.push(prefix.as_ref().to_path_buf());
    }

    /// Create (or replace) a regular file, creating missing parents.
    pub fn create_file(&self, path: impl AsRef<Path>, content: &[u8]) -> Result<FileIdentity, FsError> {
        let path = normalize(path.as_ref())?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = path.parent() {
            state.mkdir_all(parent)?;
        }
        state.check_writable(&path)?;
        if let Some(node) = state.nodes.get(&path) {
            if node.kind == Kind::Dir {
                return Err(FsError::AlreadyExists(path));
            }
        }
        state.unlink(&path);
        let identity = state.allocate(&path);
        state.nodes.insert(
            path,
            Node {
                kind: Kind::File,
                identity,
            },
        );
        state.contents.insert(identity, content.to_vec());
        Ok(identity)
    }

    /// Create a symlink entry. The target is not tracked.
    pub fn create_symlink(&self, path: impl AsRef<Path>) -> Result<(), FsError> {
        let path = normalize(path.as_ref())?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.check_parent(&path)?;
        if state.nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists(path));
        }
        let identity = state.allocate(&path);
        state.nodes.insert(
            path,
            Node {
                kind: Kind::Symlink,
                identity,
            },
        );
        Ok(())
    }

    /// Move a file like `mv`, creating missing parents of `to`.
    ///
    /// Within one device the identity is kept. Across devices the content is
    /// copied to a fresh identity and the old name is unlinked.
    pub fn move_file(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<FileIdentity, FsError> {
        let from = normalize(from.as_ref())?;
        let to = normalize(to.as_ref())?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let node = match state.nodes.get(&from) {
            Some(node) if node.kind != Kind::Dir => *node,
            Some(_) => return Err(FsError::Other(format!("cannot move directory {}", from.display()))),
            None => return Err(FsError::NotFound(from)),
        };
        if state.nodes.contains_key(&to) {
            return Err(FsError::AlreadyExists(to));
        }
        state.check_writable(&from)?;
        if let Some(parent) = to.parent() {
            state.mkdir_all(parent)?;
        }
        state.check_writable(&to)?;

        let identity = if state.device_of(&to) == node.identity.device {
            node.identity
        } else {
            let content = state.contents.get(&node.identity).cloned().unwrap_or_default();
            let identity = state.allocate(&to);
            state.contents.insert(identity, content);
            identity
        };
        state.unlink(&from);
        state.nodes.insert(
            to,
            Node {
                kind: node.kind,
                identity,
            },
        );
        Ok(identity)
    }

    /// Content of a file, if present.
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = normalize(path.as_ref()).ok()?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let node = state.nodes.get(&path)?;
        state.contents.get(&node.identity).cloned()
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        match normalize(path.as_ref()) {
            Ok(path) => {
                let state = self.state.read().unwrap_or_else(|e| e.into_inner());
                state.nodes.contains_key(&path)
            }
            Err(_) => false,
        }
    }

    /// Identity of an entry, if present.
    pub fn identity(&self, path: impl AsRef<Path>) -> Option<FileIdentity> {
        let path = normalize(path.as_ref()).ok()?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.nodes.get(&path).map(|n| n.identity)
    }

    /// Every non-directory entry strictly below `root`, sorted.
    pub fn files_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        self.entries_under(root, false)
    }

    /// Every directory strictly below `root`, sorted.
    pub fn dirs_under(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        self.entries_under(root, true)
    }

    fn entries_under(&self, root: impl AsRef<Path>, dirs: bool) -> Vec<PathBuf> {
        let Ok(root) = normalize(root.as_ref()) else {
            return Vec::new();
        };
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .nodes
            .range(root.clone()..)
            .take_while(|(p, _)| p.starts_with(&root))
            .filter(|(p, n)| **p != root && (n.kind == Kind::Dir) == dirs)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Number of names that share `identity`.
    pub fn link_count(&self, identity: FileIdentity) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.nodes.values().filter(|n| n.identity == identity).count()
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn mkdir_all(&self, path: &Path) -> Result<(), FsError> {
        let path = normalize(path)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.mkdir_all(&path)
    }

    async fn hard_link(&self, src: &Path, dst: &Path) -> Result<(), FsError> {
        let src = normalize(src)?;
        let dst = normalize(dst)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let node = match state.nodes.get(&src) {
            Some(node) if node.kind == Kind::Dir => {
                return Err(FsError::PermissionDenied(src));
            }
            Some(node) => *node,
            None => return Err(FsError::NotFound(src)),
        };
        state.check_parent(&dst)?;
        if state.nodes.contains_key(&dst) {
            return Err(FsError::AlreadyExists(dst));
        }
        state.check_writable(&dst)?;
        if state.device_of(&dst) != node.identity.device {
            return Err(FsError::CrossDevice { src, dst });
        }
        state.nodes.insert(dst, node);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), FsError> {
        let path = normalize(path)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let node = *state
            .nodes
            .get(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;
        state.check_writable(&path)?;
        if node.kind == Kind::Dir && state.has_children(&path) {
            return Err(FsError::Io {
                path,
                source: std::io::Error::new(ErrorKind::Other, "directory not empty"),
            });
        }
        state.unlink(&path);
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, FsError> {
        let path = normalize(path)?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let node = state
            .nodes
            .get(&path)
            .ok_or_else(|| FsError::NotFound(path.clone()))?;

        Ok(FileStat {
            identity: node.identity,
            is_dir: node.kind == Kind::Dir,
            len: state
                .contents
                .get(&node.identity)
                .map(|c| c.len() as u64)
                .unwrap_or(0),
        })
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let path = normalize(path)?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match state.nodes.get(&path) {
            Some(node) if node.kind == Kind::Dir => {}
            Some(_) => return Err(not_a_directory(&path)),
            None => return Err(FsError::NotFound(path)),
        }

        let mut entries: Vec<DirEntry> = state
            .nodes
            .range(path.clone()..)
            .skip(1)
            .take_while(|(p, _)| p.starts_with(&path))
            .filter(|(p, _)| p.parent() == Some(path.as_path()))
            .filter_map(|(p, node)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    path: p.clone(),
                    is_dir: node.kind == Kind::Dir,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn write_new(&self, path: &Path, content: &[u8]) -> Result<(), FsError> {
        let path = normalize(path)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.check_parent(&path)?;
        if state.nodes.contains_key(&path) {
            return Err(FsError::AlreadyExists(path));
        }
        state.check_writable(&path)?;
        let identity = state.allocate(&path);
        state.nodes.insert(
            path,
            Node {
                kind: Kind::File,
                identity,
            },
        );
        state.contents.insert(identity, content.to_vec());
        Ok(())
    }
}
