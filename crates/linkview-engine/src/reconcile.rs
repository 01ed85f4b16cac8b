//! Stale-link removal and view teardown.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use linkview_core::path::level_dir;
use linkview_core::{EngineError, FileIdentity, Filesystem, TagQuery, ViewDefinition, VirtualLayout, Workspace};
use tracing::{debug, error};

use crate::links::unlink;
use crate::project::{level_prefixes, resolve_links, shared_files};
use crate::report::PassReport;
use crate::walk::{prune_empty_dirs, walk};

/// `(link name, identity)` pairs each view directory may contain.
type Expectations = HashMap<PathBuf, HashSet<(String, FileIdentity)>>;

/// Expected entries for every level directory of `views`.
///
/// Names in a directory shared by several views are assigned over the union
/// of their qualifying files, the same way projection names them.
async fn expectations(
    query: &dyn TagQuery,
    fs: &dyn Filesystem,
    workspace_id: &str,
    virtual_root: &Path,
    views: &[ViewDefinition],
    missing: &mut HashSet<String>,
) -> Result<Expectations, EngineError> {
    let mut by_dir = Expectations::new();
    for (dir, prefixes) in level_prefixes(virtual_root, views.iter().map(|v| &v.chain)) {
        let files = shared_files(query, workspace_id, &prefixes).await?;
        let links = resolve_links(fs, files, missing).await;
        by_dir.insert(dir, links.into_iter().map(|l| (l.name, l.identity)).collect());
    }
    Ok(by_dir)
}

/// Remove every entry under `start` that `keep` rejects, then prune.
async fn sweep(
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    virtual_root: &Path,
    start: &Path,
    report: &mut PassReport,
    keep: impl Fn(&Path, &str, FileIdentity) -> bool,
) {
    let found = walk(fs, layout, virtual_root, start, report).await;

    for entry in &found.files {
        let identity = match fs.try_stat(&entry.path).await {
            Ok(Some(stat)) => stat.identity,
            Ok(None) => continue,
            Err(e) => {
                error!(path = %entry.path.display(), error = %e, "failed to stat entry");
                report.failed += 1;
                continue;
            }
        };
        let parent = entry.path.parent().unwrap_or(virtual_root);
        if !keep(parent, &entry.name, identity) && unlink(fs, &entry.path, report).await {
            debug!(path = %entry.path.display(), "removed stale entry");
            report.removed += 1;
        }
    }

    let mut dirs = found.dirs;
    if start != virtual_root {
        dirs.push(start.to_path_buf());
    }
    prune_empty_dirs(fs, dirs, report).await;
}

/// Remove every entry under the virtual root that no longer matches a
/// current source file, then prune empty directories.
///
/// Entries in a view directory must be a qualifying file of that directory,
/// by name and identity. Entries in a recorded plan folder only need to be
/// an eligible file of the workspace. Anything else is removed.
pub(crate) async fn reconcile(
    query: &dyn TagQuery,
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    workspace: &Workspace,
    views: &[ViewDefinition],
    plan_dirs: &HashSet<PathBuf>,
    report: &mut PassReport,
) -> Result<(), EngineError> {
    let virtual_root = layout.virtual_root(workspace);
    match fs.try_stat(&virtual_root).await {
        Ok(Some(stat)) if stat.is_dir => {}
        Ok(_) => {
            debug!(root = %virtual_root.display(), "nothing materialized yet");
            return Ok(());
        }
        Err(source) => {
            return Err(EngineError::Setup {
                path: virtual_root,
                source,
            })
        }
    }

    let mut missing = HashSet::new();
    let expected = expectations(query, fs, &workspace.id, &virtual_root, views, &mut missing).await?;
    let eligible: HashSet<FileIdentity> = {
        let files = query.list_qualifying_files(&workspace.id, &[]).await?;
        resolve_links(fs, files, &mut missing)
            .await
            .into_iter()
            .map(|l| l.identity)
            .collect()
    };

    sweep(fs, layout, &virtual_root, &virtual_root, report, |dir, name, identity| {
        match expected.get(dir) {
            Some(allowed) => allowed.contains(&(name.to_string(), identity)),
            None => plan_dirs.contains(dir) && eligible.contains(&identity),
        }
    })
    .await;

    report.skipped_missing += missing.len();
    Ok(())
}

/// Remove the directory subtree of a deleted view.
///
/// Directories that are also a level of a `remaining` view keep the entries
/// that still qualify there; everything else under the view's first level is
/// removed.
pub(crate) async fn remove_view_tree(
    query: &dyn TagQuery,
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    workspace: &Workspace,
    removed: &ViewDefinition,
    remaining: &[ViewDefinition],
    report: &mut PassReport,
) -> Result<(), EngineError> {
    if removed.chain.is_empty() {
        return Ok(());
    }
    let virtual_root = layout.virtual_root(workspace);
    let top = level_dir(&virtual_root, removed.chain.prefix(1));

    let sharing: Vec<ViewDefinition> = remaining
        .iter()
        .filter(|v| !v.chain.is_empty() && level_dir(&virtual_root, v.chain.prefix(1)) == top)
        .cloned()
        .collect();
    let mut missing = HashSet::new();
    let expected = expectations(query, fs, &workspace.id, &virtual_root, &sharing, &mut missing).await?;
    debug!(view = %removed.id, top = %top.display(), shared_dirs = expected.len(), "removing view tree");

    sweep(fs, layout, &virtual_root, &top, report, |dir, name, identity| {
        expected
            .get(dir)
            .map(|allowed| allowed.contains(&(name.to_string(), identity)))
            .unwrap_or(false)
    })
    .await;

    Ok(())
}
