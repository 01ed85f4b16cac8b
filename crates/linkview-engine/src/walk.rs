//! Iterative traversal of a virtual root.

use std::path::{Path, PathBuf};

use linkview_core::{DirEntry, FileIdentity, Filesystem, VirtualLayout};
use tracing::error;

use crate::links::unlink;
use crate::report::PassReport;

/// Everything found below a starting directory.
#[derive(Debug, Default)]
pub(crate) struct Walk {
    /// Directories below the start, each listed before its children.
    pub dirs: Vec<PathBuf>,
    /// Non-directory entries, markers excluded.
    pub files: Vec<DirEntry>,
}

/// Walk `start` (the virtual root or a directory inside it) with an explicit
/// worklist. Markers are skipped everywhere, the thumbnail folder only
/// directly under the virtual root.
pub(crate) async fn walk(
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    virtual_root: &Path,
    start: &Path,
    report: &mut PassReport,
) -> Walk {
    let mut walk = Walk::default();
    let mut pending = vec![start.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs.list_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "failed to list directory");
                report.failed += 1;
                continue;
            }
        };

        for entry in entries {
            if layout.is_marker(&entry.name) {
                continue;
            }
            if entry.is_dir {
                if dir == virtual_root && layout.is_reserved_dir(&entry.name) {
                    continue;
                }
                walk.dirs.push(entry.path.clone());
                pending.push(entry.path);
            } else {
                walk.files.push(entry);
            }
        }
    }

    walk
}

/// Every entry under the virtual root whose identity is `identity`.
pub(crate) async fn find_links(
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    virtual_root: &Path,
    identity: FileIdentity,
    report: &mut PassReport,
) -> Vec<PathBuf> {
    let found = walk(fs, layout, virtual_root, virtual_root, report).await;
    let mut links = Vec::new();
    for entry in found.files {
        match fs.try_stat(&entry.path).await {
            Ok(Some(stat)) if stat.identity == identity => links.push(entry.path),
            Ok(_) => {}
            Err(e) => {
                error!(path = %entry.path.display(), error = %e, "failed to stat entry");
                report.failed += 1;
            }
        }
    }
    links.sort();
    links
}

/// Remove every directory in `dirs` that is empty, deepest first.
///
/// `dirs` must not contain the virtual root.
pub(crate) async fn prune_empty_dirs(
    fs: &dyn Filesystem,
    mut dirs: Vec<PathBuf>,
    report: &mut PassReport,
) {
    dirs.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
    dirs.dedup();

    for dir in dirs {
        match fs.list_dir(&dir).await {
            Ok(entries) if entries.is_empty() => {
                if unlink(fs, &dir, report).await {
                    report.dirs_pruned += 1;
                }
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "failed to list directory");
                report.failed += 1;
            }
        }
    }
}

/// Walk the whole virtual root and prune what is left empty.
pub(crate) async fn prune_virtual_root(
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    virtual_root: &Path,
    report: &mut PassReport,
) {
    let found = walk(fs, layout, virtual_root, virtual_root, report).await;
    prune_empty_dirs(fs, found.dirs, report).await;
}
