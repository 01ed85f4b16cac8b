use std::collections::HashSet;
use std::path::PathBuf;

use linkview_core::{FileIdentity, Filesystem, VirtualLayout};
use tracing::debug;

use crate::links::{dir_links, unlink};
use crate::project::Projection;
use crate::report::PassReport;

/// Keep each file a view just projected only at its deepest level.
///
/// Works from the links the projection placed, so a stale link left deeper
/// in the tree by an earlier pass never pushes a valid one out.
pub(crate) async fn dedup_projection(
    fs: &dyn Filesystem,
    projection: &Projection,
    report: &mut PassReport,
) {
    for paths in projection.placed.values() {
        let Some((_, shallower)) = paths.split_last() else {
            continue;
        };
        for path in shallower {
            if unlink(fs, path, report).await {
                debug!(path = %path.display(), "removed shallower duplicate");
                report.deduplicated += 1;
            }
        }
    }
}

/// Keep each file only at its deepest level of an ancestry chain.
///
/// `dirs` runs shallow to deep, each one a child of the previous. Working up
/// from the deepest, every identity found at a level is removed from all the
/// levels above it. Matching is by identity, so a file linked under a
/// different name above is still caught.
pub(crate) async fn dedup_chain(
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    dirs: &[PathBuf],
    report: &mut PassReport,
) {
    for deep in (1..dirs.len()).rev() {
        let deeper: HashSet<FileIdentity> = dir_links(fs, layout, &dirs[deep], report)
            .await
            .into_iter()
            .map(|(_, identity)| identity)
            .collect();
        if deeper.is_empty() {
            continue;
        }

        for shallow in &dirs[..deep] {
            for (entry, identity) in dir_links(fs, layout, shallow, report).await {
                if deeper.contains(&identity) && unlink(fs, &entry.path, report).await {
                    debug!(path = %entry.path.display(), "removed shallower duplicate");
                    report.deduplicated += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkview_fs::MemoryFs;
    use std::path::Path;

    #[tokio::test]
    async fn test_deepest_level_wins() {
        let fs = MemoryFs::new();
        fs.create_file("/ws/x.txt", b"x").unwrap();
        fs.create_file("/ws/y.txt", b"y").unwrap();
        for dir in ["/v/A", "/v/A/B", "/v/A/B/C"] {
            fs.mkdir_all(Path::new(dir)).await.unwrap();
        }
        // x at all three levels, y only at the first two.
        for dst in ["/v/A/x.txt", "/v/A/B/x.txt", "/v/A/B/C/x.txt", "/v/A/y.txt", "/v/A/B/y.txt"] {
            let src = if dst.ends_with("x.txt") { "/ws/x.txt" } else { "/ws/y.txt" };
            fs.hard_link(Path::new(src), Path::new(dst)).await.unwrap();
        }

        let dirs: Vec<PathBuf> = ["/v/A", "/v/A/B", "/v/A/B/C"].iter().map(PathBuf::from).collect();
        let mut report = PassReport::default();
        dedup_chain(&fs, &VirtualLayout::default(), &dirs, &mut report).await;

        assert_eq!(
            fs.files_under("/v"),
            vec![PathBuf::from("/v/A/B/C/x.txt"), PathBuf::from("/v/A/B/y.txt")]
        );
        assert_eq!(report.deduplicated, 3);
    }

    #[tokio::test]
    async fn test_projection_keeps_deepest_placement() {
        let fs = MemoryFs::new();
        let x = fs.create_file("/ws/x.txt", b"x").unwrap();
        fs.mkdir_all(Path::new("/v/A/B/C")).await.unwrap();
        for dst in ["/v/A/x.txt", "/v/A/B/x.txt", "/v/A/B/C/x.txt"] {
            fs.hard_link(Path::new("/ws/x.txt"), Path::new(dst)).await.unwrap();
        }

        // Only the first two were placed by this pass; the third is stale.
        let mut projection = Projection::default();
        projection
            .placed
            .insert(x, vec![PathBuf::from("/v/A/x.txt"), PathBuf::from("/v/A/B/x.txt")]);
        let mut report = PassReport::default();
        dedup_projection(&fs, &projection, &mut report).await;

        assert!(!fs.exists("/v/A/x.txt"));
        assert!(fs.exists("/v/A/B/x.txt"));
        assert!(fs.exists("/v/A/B/C/x.txt"));
        assert_eq!(report.deduplicated, 1);
    }

    #[tokio::test]
    async fn test_renamed_duplicate_is_caught() {
        let fs = MemoryFs::new();
        fs.create_file("/ws/x.txt", b"x").unwrap();
        fs.mkdir_all(Path::new("/v/A/B")).await.unwrap();
        fs.hard_link(Path::new("/ws/x.txt"), Path::new("/v/A/x (2).txt")).await.unwrap();
        fs.hard_link(Path::new("/ws/x.txt"), Path::new("/v/A/B/x.txt")).await.unwrap();

        let dirs = vec![PathBuf::from("/v/A"), PathBuf::from("/v/A/B")];
        let mut report = PassReport::default();
        dedup_chain(&fs, &VirtualLayout::default(), &dirs, &mut report).await;
        assert!(!fs.exists("/v/A/x (2).txt"));
        assert!(fs.exists("/v/A/B/x.txt"));
    }
}
