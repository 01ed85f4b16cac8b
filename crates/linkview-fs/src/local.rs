use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use linkview_core::{DirEntry, FileIdentity, FileStat, Filesystem, FsError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// The real operating-system filesystem.
///
/// A `LocalFs` can be confined to a set of roots; mutating calls whose target
/// lies outside every root are refused. Link sources may live anywhere.
#[derive(Debug, Clone, Default)]
pub struct LocalFs {
    roots: Vec<PathBuf>,
}

impl LocalFs {
    /// An unconfined filesystem.
    pub fn new() -> Self {
        LocalFs { roots: Vec::new() }
    }

    /// A filesystem that only mutates paths below one of `roots`.
    pub fn confined_to<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        LocalFs {
            roots: roots
                .into_iter()
                .map(|r| normalize(r.as_ref()))
                .collect(),
        }
    }

    fn check_target(&self, path: &Path) -> Result<(), FsError> {
        if self.roots.is_empty() {
            return Ok(());
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(FsError::OutsideRoot(path.to_path_buf()));
        }
        let normalized = normalize(path);
        if self.roots.iter().any(|root| normalized.starts_with(root)) {
            Ok(())
        } else {
            Err(FsError::OutsideRoot(path.to_path_buf()))
        }
    }
}

/// Drop `.` components; `..` is rejected separately.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(unix)]
fn identity(metadata: &Metadata) -> Result<FileIdentity, FsError> {
    use std::os::unix::fs::MetadataExt;

    Ok(FileIdentity::new(metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn identity(_metadata: &Metadata) -> Result<FileIdentity, FsError> {
    Err(FsError::Other(
        "file identity is only available on unix platforms".to_string(),
    ))
}

#[async_trait]
impl Filesystem for LocalFs {
    #[instrument(skip(self), fields(fs = "local", path = %path.display()))]
    async fn mkdir_all(&self, path: &Path) -> Result<(), FsError> {
        self.check_target(path)?;
        fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    #[instrument(skip(self), fields(fs = "local", src = %src.display(), dst = %dst.display()))]
    async fn hard_link(&self, src: &Path, dst: &Path) -> Result<(), FsError> {
        self.check_target(dst)?;
        debug!("creating hardlink");
        let Err(err) = fs::hard_link(src, dst).await else {
            return Ok(());
        };
        let source_missing = err.kind() == ErrorKind::NotFound
            && matches!(fs::symlink_metadata(src).await, Err(e) if e.kind() == ErrorKind::NotFound);
        Err(FsError::from_link_io(src, dst, err, source_missing))
    }

    #[instrument(skip(self), fields(fs = "local", path = %path.display()))]
    async fn remove(&self, path: &Path) -> Result<(), FsError> {
        self.check_target(path)?;
        let metadata = fs::symlink_metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        if metadata.is_dir() {
            fs::remove_dir(path).await
        } else {
            fs::remove_file(path).await
        }
        .map_err(|e| FsError::from_io(path, e))
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, FsError> {
        let metadata = fs::symlink_metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        Ok(FileStat {
            identity: identity(&metadata)?,
            is_dir: metadata.is_dir(),
            len: if metadata.is_dir() { 0 } else { metadata.len() },
        })
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let mut read_dir = fs::read_dir(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(path, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| FsError::from_io(entry.path(), e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                is_dir: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    #[instrument(skip(self, content), fields(fs = "local", path = %path.display(), size = content.len()))]
    async fn write_new(&self, path: &Path, content: &[u8]) -> Result<(), FsError> {
        self.check_target(path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        file.write_all(content)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        file.flush().await.map_err(|e| FsError::from_io(path, e))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs as unix_fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hard_link_shares_identity() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();

        let fs = LocalFs::new();
        let dst = tmp.path().join("b.txt");
        fs.hard_link(&src, &dst).await.unwrap();

        let a = fs.stat(&src).await.unwrap();
        let b = fs.stat(&dst).await.unwrap();
        assert_eq!(a.identity, b.identity);
        assert_eq!(b.len, 5);
        assert!(!b.is_dir);
    }

    #[tokio::test]
    async fn test_hard_link_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("b.txt");
        std::fs::write(&src, b"a").unwrap();
        std::fs::write(&dst, b"b").unwrap();

        let err = LocalFs::new().hard_link(&src, &dst).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_hard_link_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = LocalFs::new()
            .hard_link(&tmp.path().join("nope.txt"), &tmp.path().join("b.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(p) if p == tmp.path().join("nope.txt")));
    }

    #[tokio::test]
    async fn test_hard_link_missing_destination_dir() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        std::fs::write(&src, b"a").unwrap();
        let dst = tmp.path().join("absent").join("b.txt");

        let err = LocalFs::new().hard_link(&src, &dst).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(p) if p == dst));
    }

    #[tokio::test]
    async fn test_list_dir_sorted_and_typed() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), b"b").unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        unix_fs::symlink(tmp.path().join("a"), tmp.path().join("c")).unwrap();

        let entries = LocalFs::new().list_dir(tmp.path()).await.unwrap();
        let summary: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.is_dir)).collect();
        assert_eq!(summary, vec![("a", true), ("b.txt", false), ("c", false)]);
    }

    #[tokio::test]
    async fn test_remove_file_and_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("d");
        let file = dir.join("f.txt");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(&file, b"x").unwrap();

        let fs = LocalFs::new();
        assert!(fs.remove(&dir).await.is_err());
        fs.remove(&file).await.unwrap();
        fs.remove(&dir).await.unwrap();
        assert!(!dir.exists());
        assert!(fs.remove(&dir).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_symlink_keeps_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let link = tmp.path().join("link");
        unix_fs::symlink(&target, &link).unwrap();

        LocalFs::new().remove(&link).await.unwrap();
        assert!(target.exists());
        assert!(std::fs::symlink_metadata(&link).is_err());
    }

    #[tokio::test]
    async fn test_write_new_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("marker.txt");
        let fs = LocalFs::new();

        fs.write_new(&path, b"first").await.unwrap();
        let err = fs.write_new(&path, b"second").await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_try_stat_missing() {
        let tmp = TempDir::new().unwrap();
        let stat = LocalFs::new().try_stat(&tmp.path().join("nope")).await.unwrap();
        assert!(stat.is_none());
    }

    #[tokio::test]
    async fn test_confined_rejects_outside_mutation() {
        let inside = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("keep.txt");
        std::fs::write(&victim, b"keep").unwrap();

        let fs = LocalFs::confined_to([inside.path()]);
        let err = fs.remove(&victim).await.unwrap_err();
        assert!(matches!(err, FsError::OutsideRoot(_)));
        assert!(victim.exists());

        let sneaky = inside.path().join("..").join("escape");
        assert!(matches!(
            fs.mkdir_all(&sneaky).await.unwrap_err(),
            FsError::OutsideRoot(_)
        ));

        // Sources outside the root are fine, only the destination is checked.
        fs.hard_link(&victim, &inside.path().join("keep.txt"))
            .await
            .unwrap();
    }
}
