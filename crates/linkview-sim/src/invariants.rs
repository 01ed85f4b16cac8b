use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use linkview_core::path::level_dir;
use linkview_core::{
    relation, ChainRelation, FileIdentity, Filesystem, FsError, TagSelector, ViewDefinition, VirtualLayout,
    Workspace,
};
use linkview_fs::MemoryFs;
use linkview_store::{Catalog, FileRecord};

/// A violation detected during simulation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub step: usize,
    pub invariant: String,
    pub details: String,
}

impl Violation {
    fn new(step: usize, invariant: &str, details: String) -> Self {
        Violation {
            step,
            invariant: invariant.to_string(),
            details,
        }
    }
}

/// No stored view may have a chain that is a strict prefix of another's.
pub fn check_step_invariants(step: usize, views: &[ViewDefinition]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for a in views {
        for b in views {
            if a.id != b.id && relation(&a.chain, &b.chain) == ChainRelation::Broader {
                violations.push(Violation::new(
                    step,
                    "prefix-conflict",
                    format!("view '{}' {} is a prefix of view '{}' {}", a.id, a.chain, b.id, b.chain),
                ));
            }
        }
    }
    violations
}

/// Files and directories found below a virtual root.
#[derive(Debug, Default)]
struct TreeScan {
    files: Vec<(PathBuf, Option<FileIdentity>)>,
    /// Every directory below the root with its entry count.
    dirs: Vec<(PathBuf, usize)>,
}

async fn scan_tree(fs: &dyn Filesystem, root: &Path, skip: &Path) -> Result<TreeScan, FsError> {
    let mut scan = TreeScan::default();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs.list_dir(&dir).await?;
        if dir != root {
            scan.dirs.push((dir.clone(), entries.len()));
        }
        for entry in entries {
            if entry.path.starts_with(skip) {
                continue;
            }
            if entry.is_dir {
                pending.push(entry.path);
            } else {
                let identity = fs.try_stat(&entry.path).await?.map(|stat| stat.identity);
                scan.files.push((entry.path, identity));
            }
        }
    }
    Ok(scan)
}

/// Check the materialized tree against the catalog after a settling pass.
///
/// Every entry must be a link to an eligible source. Entries in a view
/// directory must qualify for that directory; entries anywhere else must sit
/// in one of `plan_dirs` and link a source no view directory holds. No
/// source may be linked twice across view directories, every source
/// qualifying for a view's first level must be linked somewhere, and no
/// empty directory may remain.
pub async fn check_final_consistency(
    step: usize,
    fs: &dyn Filesystem,
    catalog: &dyn Catalog,
    layout: &VirtualLayout,
    workspace: &Workspace,
    views: &[ViewDefinition],
    plan_dirs: &HashSet<PathBuf>,
) -> Vec<Violation> {
    let mut violations = check_step_invariants(step, views);
    let virtual_root = layout.virtual_root(workspace);
    if !matches!(fs.try_stat(&virtual_root).await, Ok(Some(_))) {
        return violations;
    }
    let thumbnails = virtual_root.join(&layout.thumbnail_dir);

    let records = match catalog.list_files(&workspace.id) {
        Ok(records) => records,
        Err(e) => {
            violations.push(Violation::new(step, "catalog-readable", e.to_string()));
            return violations;
        }
    };
    let mut sources: HashMap<FileIdentity, &FileRecord> = HashMap::new();
    for record in records.iter().filter(|r| r.eligible) {
        if let Ok(Some(stat)) = fs.try_stat(&record.path).await {
            if !stat.is_dir {
                sources.insert(stat.identity, record);
            }
        }
    }

    // Views over different dimensions share a directory when their values match.
    let mut view_dirs: HashMap<PathBuf, Vec<&[TagSelector]>> = HashMap::new();
    for view in views {
        for level in 1..=view.chain.len() {
            let prefix = view.chain.prefix(level);
            view_dirs.entry(level_dir(&virtual_root, prefix)).or_default().push(prefix);
        }
    }

    if !matches!(fs.try_stat(&layout.marker_path(workspace)).await, Ok(Some(_))) {
        violations.push(Violation::new(
            step,
            "marker-present",
            format!("{} has no marker file", virtual_root.display()),
        ));
    }

    let scan = match scan_tree(fs, &virtual_root, &thumbnails).await {
        Ok(scan) => scan,
        Err(e) => {
            violations.push(Violation::new(step, "tree-readable", e.to_string()));
            return violations;
        }
    };

    let mut placements: BTreeMap<FileIdentity, Vec<PathBuf>> = BTreeMap::new();
    let mut elsewhere: Vec<(FileIdentity, PathBuf)> = Vec::new();
    for (path, identity) in scan.files {
        if is_marker(layout, &path) {
            continue;
        }
        let Some(identity) = identity else {
            continue;
        };
        let Some(record) = sources.get(&identity) else {
            violations.push(Violation::new(
                step,
                "orphan-link",
                format!("{} does not link to an eligible source", path.display()),
            ));
            continue;
        };

        let parent = path.parent().unwrap_or(&virtual_root);
        match view_dirs.get(parent) {
            Some(prefixes) => {
                if !prefixes.iter().any(|prefix| record.qualifies(prefix)) {
                    violations.push(Violation::new(
                        step,
                        "stale-link",
                        format!("{} links {} which no longer qualifies", path.display(), record.id),
                    ));
                }
                placements.entry(identity).or_default().push(path.clone());
            }
            None if plan_dirs.contains(parent) => elsewhere.push((identity, path.clone())),
            None => violations.push(Violation::new(
                step,
                "stray-entry",
                format!("{} is outside every view and plan directory", path.display()),
            )),
        }
    }

    for (identity, path) in &elsewhere {
        if let Some(held) = placements.get(identity) {
            violations.push(Violation::new(
                step,
                "duplicate-link",
                format!("{} also links the file held at {:?}", path.display(), held),
            ));
        }
    }

    for (identity, paths) in &placements {
        if paths.len() > 1 {
            violations.push(Violation::new(
                step,
                "duplicate-link",
                format!("{} is linked {} times: {:?}", identity, paths.len(), paths),
            ));
        }
    }

    for (identity, record) in &sources {
        let qualifies_somewhere = views
            .iter()
            .any(|v| !v.chain.is_empty() && record.qualifies(v.chain.prefix(1)));
        if qualifies_somewhere && !placements.contains_key(identity) {
            violations.push(Violation::new(
                step,
                "unlinked-file",
                format!("{} qualifies for a view but has no link", record.id),
            ));
        }
    }

    for (dir, entries) in scan.dirs {
        if entries == 0 {
            violations.push(Violation::new(
                step,
                "empty-dir",
                format!("{} was not pruned", dir.display()),
            ));
        }
    }

    violations
}

fn is_marker(layout: &VirtualLayout, path: &Path) -> bool {
    path.file_name()
        .map(|n| layout.is_marker(&n.to_string_lossy()))
        .unwrap_or(false)
}

/// Every entry under the virtual root with its identity, for comparing runs.
pub fn snapshot(fs: &MemoryFs, virtual_root: &Path) -> Vec<(PathBuf, Option<FileIdentity>)> {
    fs.files_under(virtual_root)
        .into_iter()
        .map(|p| {
            let identity = fs.identity(&p);
            (p, identity)
        })
        .collect()
}
