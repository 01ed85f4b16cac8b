//! Single-entry primitives. Each one checks the current state right before
//! acting, and treats "already in the desired state" as success.

use std::path::Path;

use linkview_core::{DirEntry, FileIdentity, Filesystem, QualifyingFile, VirtualLayout};
use tracing::{debug, error, warn};

use crate::report::PassReport;

/// Make `dst` a hardlink to `src`, whose identity is `identity`.
///
/// Returns true when `dst` ends up linked to the source.
pub(crate) async fn place_link(
    fs: &dyn Filesystem,
    src: &Path,
    identity: FileIdentity,
    dst: &Path,
    report: &mut PassReport,
) -> bool {
    let repairing = match fs.try_stat(dst).await {
        Ok(None) => false,
        Ok(Some(stat)) if stat.is_dir => {
            error!(path = %dst.display(), "directory in the way of link");
            report.failed += 1;
            return false;
        }
        Ok(Some(stat)) if stat.identity == identity => {
            report.already_present += 1;
            return true;
        }
        Ok(Some(stat)) => {
            debug!(path = %dst.display(), found = %stat.identity, expected = %identity, "replacing stale link");
            match fs.remove(dst).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(path = %dst.display(), error = %e, "failed to remove stale link");
                    report.failed += 1;
                    return false;
                }
            }
            true
        }
        Err(e) => {
            error!(path = %dst.display(), error = %e, "failed to stat link target");
            report.failed += 1;
            return false;
        }
    };

    match fs.hard_link(src, dst).await {
        Ok(()) => {
            debug!(src = %src.display(), dst = %dst.display(), "linked");
            if repairing {
                report.repaired += 1;
            } else {
                report.linked += 1;
            }
            true
        }
        // Someone else created it between our stat and link.
        Err(e) if e.is_already_exists() => match fs.try_stat(dst).await {
            Ok(Some(stat)) if stat.identity == identity => {
                report.already_present += 1;
                true
            }
            _ => {
                error!(path = %dst.display(), "link target taken by another file");
                report.failed += 1;
                false
            }
        },
        Err(e) if e.is_not_found() => {
            if fs.try_stat(src).await.ok().flatten().is_none() {
                warn!(src = %src.display(), "source vanished before it could be linked");
                report.skipped_missing += 1;
            } else {
                error!(dst = %dst.display(), "link directory vanished");
                report.failed += 1;
            }
            false
        }
        Err(e) => {
            error!(src = %src.display(), dst = %dst.display(), error = %e, "failed to create hardlink");
            report.failed += 1;
            false
        }
    }
}

/// Remove one entry. Returns true if this call removed it.
pub(crate) async fn unlink(fs: &dyn Filesystem, path: &Path, report: &mut PassReport) -> bool {
    match fs.remove(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed entry");
            true
        }
        Err(e) if e.is_not_found() => false,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to remove entry");
            report.failed += 1;
            false
        }
    }
}

/// Identity of a source file, or `None` (logged) if it cannot be used.
pub(crate) async fn source_identity(
    fs: &dyn Filesystem,
    file: &QualifyingFile,
) -> Option<FileIdentity> {
    match fs.try_stat(&file.path).await {
        Ok(Some(stat)) if !stat.is_dir => Some(stat.identity),
        Ok(Some(_)) => {
            warn!(file_id = %file.file_id, path = %file.path.display(), "source is a directory");
            None
        }
        Ok(None) => {
            warn!(file_id = %file.file_id, path = %file.path.display(), "source file missing");
            None
        }
        Err(e) => {
            warn!(file_id = %file.file_id, path = %file.path.display(), error = %e, "source file unreadable");
            None
        }
    }
}

/// Non-directory entries of `dir` with their identities.
///
/// A missing directory has no entries. Markers are never returned.
pub(crate) async fn dir_links(
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    dir: &Path,
    report: &mut PassReport,
) -> Vec<(DirEntry, FileIdentity)> {
    let entries = match fs.list_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.is_not_found() => return Vec::new(),
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "failed to list directory");
            report.failed += 1;
            return Vec::new();
        }
    };

    let mut links = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.is_dir || layout.is_marker(&entry.name) {
            continue;
        }
        match fs.try_stat(&entry.path).await {
            Ok(Some(stat)) => links.push((entry, stat.identity)),
            Ok(None) => {}
            Err(e) => {
                error!(path = %entry.path.display(), error = %e, "failed to stat entry");
                report.failed += 1;
            }
        }
    }
    links
}
