use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use linkview_core::{EngineError, FileIdentity, Filesystem, TagQuery, ViewDefinition, VirtualLayout};
use tracing::debug;

use crate::links::{dir_links, unlink};
use crate::project::{level_prefixes, resolve_links, shared_files, Projection};
use crate::report::PassReport;

/// Take the files a view just captured out of every rival view.
///
/// `rivals` excludes the view itself and views with an identical chain. A
/// directory a rival shares with the view keeps the entry that is the captured
/// file's own link. When a rival holds the file deeper below the captured
/// link's directory and the file still qualifies there, that link is the more
/// specific one and the captured link is removed instead.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn enforce_exclusivity(
    query: &dyn TagQuery,
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    workspace_id: &str,
    virtual_root: &Path,
    rivals: &[&ViewDefinition],
    projection: &Projection,
    report: &mut PassReport,
) -> Result<(), EngineError> {
    if projection.captured.is_empty() {
        return Ok(());
    }

    let dirs = level_prefixes(virtual_root, rivals.iter().map(|r| &r.chain));

    let mut qualifying: HashMap<PathBuf, HashSet<FileIdentity>> = HashMap::new();
    for (dir, prefixes) in &dirs {
        for (entry, identity) in dir_links(fs, layout, dir, report).await {
            let Some(home) = projection.captured.get(&identity) else {
                continue;
            };
            if *home == entry.path {
                continue;
            }

            if is_below(dir, home) {
                if !qualifying.contains_key(dir) {
                    let mut missing = HashSet::new();
                    let files = shared_files(query, workspace_id, prefixes).await?;
                    let ids = resolve_links(fs, files, &mut missing)
                        .await
                        .into_iter()
                        .map(|link| link.identity)
                        .collect();
                    qualifying.insert(dir.clone(), ids);
                }
                let deeper_is_valid = qualifying.get(dir).is_some_and(|ids| ids.contains(&identity));
                if deeper_is_valid {
                    if unlink(fs, home, report).await {
                        debug!(path = %home.display(), deeper = %entry.path.display(), "shared tree holds a deeper link");
                        report.deduplicated += 1;
                    }
                    continue;
                }
            }

            if unlink(fs, &entry.path, report).await {
                debug!(path = %entry.path.display(), home = %home.display(), "released to saved view");
                report.exclusivity_removed += 1;
            }
        }
    }
    Ok(())
}

/// True if `dir` lies strictly below the directory holding `link`.
fn is_below(dir: &Path, link: &Path) -> bool {
    match link.parent() {
        Some(home_dir) => dir != home_dir && dir.starts_with(home_dir),
        None => false,
    }
}
