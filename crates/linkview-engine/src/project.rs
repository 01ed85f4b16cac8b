//! Hardlink projection of a tag chain, one level at a time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use linkview_core::path::{level_dir, with_collision_suffix};
use linkview_core::{EngineError, FileIdentity, Filesystem, QualifyingFile, TagChain, TagQuery, TagSelector};
use tracing::{debug, error};

use crate::links::{place_link, source_identity, unlink};
use crate::report::PassReport;

/// A link some directory should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExpectedLink {
    pub file_id: String,
    pub source: PathBuf,
    pub identity: FileIdentity,
    pub name: String,
}

/// Give every file a link name, first come first served by file id.
///
/// Later files whose name is taken get ` (2)`, ` (3)`, ... spliced in.
pub(crate) fn assign_names(mut files: Vec<QualifyingFile>) -> Vec<(QualifyingFile, String)> {
    files.sort_by(|a, b| a.file_id.cmp(&b.file_id));
    files.dedup_by(|a, b| a.file_id == b.file_id);

    let mut taken = HashSet::new();
    let mut named = Vec::with_capacity(files.len());
    for file in files {
        let base = file.link_file_name();
        let mut name = base.clone();
        let mut n = 1;
        while taken.contains(&name) {
            n += 1;
            name = with_collision_suffix(&base, n);
        }
        taken.insert(name.clone());
        named.push((file, name));
    }
    named
}

/// Resolve named links for `files`, dropping sources that cannot be read.
///
/// Unreadable sources are added to `missing` so a caller visiting several
/// levels counts each file once.
pub(crate) async fn resolve_links(
    fs: &dyn Filesystem,
    files: Vec<QualifyingFile>,
    missing: &mut HashSet<String>,
) -> Vec<ExpectedLink> {
    let mut links = Vec::with_capacity(files.len());
    for (file, name) in assign_names(files) {
        match source_identity(fs, &file).await {
            Some(identity) => links.push(ExpectedLink {
                file_id: file.file_id,
                source: file.path,
                identity,
                name,
            }),
            None => {
                missing.insert(file.file_id);
            }
        }
    }
    links
}

/// Every distinct chain prefix of `chains`, grouped by its level directory.
///
/// Prefixes over different dimensions map to the same directory when their
/// tag values match; such a directory is shared by all of them.
pub(crate) fn level_prefixes<'a>(
    virtual_root: &Path,
    chains: impl IntoIterator<Item = &'a TagChain>,
) -> BTreeMap<PathBuf, Vec<&'a [TagSelector]>> {
    let mut by_dir: BTreeMap<PathBuf, Vec<&'a [TagSelector]>> = BTreeMap::new();
    for chain in chains {
        for level in 1..=chain.len() {
            let prefix = chain.prefix(level);
            let prefixes = by_dir.entry(level_dir(virtual_root, prefix)).or_default();
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
    }
    by_dir
}

/// Qualifying files of every prefix sharing a directory.
pub(crate) async fn shared_files(
    query: &dyn TagQuery,
    workspace_id: &str,
    prefixes: &[&[TagSelector]],
) -> Result<Vec<QualifyingFile>, EngineError> {
    let mut files = Vec::new();
    for prefix in prefixes {
        files.extend(query.list_qualifying_files(workspace_id, prefix).await?);
    }
    Ok(files)
}

/// Non-directory entries of a level directory, grouped by identity.
async fn present_names(fs: &dyn Filesystem, dir: &Path) -> HashMap<FileIdentity, Vec<String>> {
    let mut present: HashMap<FileIdentity, Vec<String>> = HashMap::new();
    let Ok(entries) = fs.list_dir(dir).await else {
        return present;
    };
    for entry in entries.into_iter().filter(|e| !e.is_dir) {
        if let Ok(Some(stat)) = fs.try_stat(&entry.path).await {
            present.entry(stat.identity).or_default().push(entry.name);
        }
    }
    present
}

/// What a projection produced.
#[derive(Debug, Default)]
pub(crate) struct Projection {
    /// Deepest link placed for each captured file.
    pub captured: HashMap<FileIdentity, PathBuf>,
    /// Every link placed for each file, shallow to deep.
    pub placed: HashMap<FileIdentity, Vec<PathBuf>>,
}

/// Link every qualifying file at every level of `chain`.
///
/// Link names in a directory are assigned over every prefix of `chain` and
/// `neighbours` that maps to it. Entries of neighbouring views whose name
/// moved are linked under the new name; leftovers under old names go.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn project(
    query: &dyn TagQuery,
    fs: &dyn Filesystem,
    workspace_id: &str,
    virtual_root: &Path,
    chain: &TagChain,
    neighbours: &[&TagChain],
    report: &mut PassReport,
) -> Result<Projection, EngineError> {
    let mut projection = Projection::default();
    let mut missing = HashSet::new();
    let shared = level_prefixes(virtual_root, neighbours.iter().copied().chain(std::iter::once(chain)));

    for level in 1..=chain.len() {
        let prefix = chain.prefix(level);
        let dir = level_dir(virtual_root, prefix);

        let own = query.list_qualifying_files(workspace_id, prefix).await?;
        debug!(level, dir = %dir.display(), files = own.len(), "projecting level");
        if own.is_empty() {
            continue;
        }
        let own_ids: HashSet<String> = own.iter().map(|f| f.file_id.clone()).collect();
        let others: Vec<&[TagSelector]> = shared
            .get(&dir)
            .map(|prefixes| prefixes.iter().copied().filter(|p| *p != prefix).collect())
            .unwrap_or_default();
        let mut files = own;
        files.extend(shared_files(query, workspace_id, &others).await?);

        if let Err(e) = fs.mkdir_all(&dir).await {
            error!(dir = %dir.display(), error = %e, "failed to create view directory");
            report.failed += own_ids.len();
            continue;
        }
        let present = if others.is_empty() {
            HashMap::new()
        } else {
            present_names(fs, &dir).await
        };

        let mut settled: Vec<(FileIdentity, String)> = Vec::new();
        for (file, name) in assign_names(files) {
            let dst = dir.join(&name);
            if own_ids.contains(&file.file_id) {
                let Some(identity) = source_identity(fs, &file).await else {
                    missing.insert(file.file_id);
                    continue;
                };
                if place_link(fs, &file.path, identity, &dst, report).await {
                    projection.placed.entry(identity).or_default().push(dst.clone());
                    projection.captured.insert(identity, dst);
                    settled.push((identity, name));
                }
                continue;
            }

            // A neighbour's file: only move an entry that is already here.
            let Ok(Some(stat)) = fs.try_stat(&file.path).await else {
                continue;
            };
            match present.get(&stat.identity) {
                Some(names) if !names.contains(&name) => {
                    debug!(file_id = %file.file_id, name = %name, "renaming shared entry");
                    if place_link(fs, &file.path, stat.identity, &dst, report).await {
                        settled.push((stat.identity, name));
                    }
                }
                _ => {}
            }
        }

        for (identity, name) in settled {
            let Some(names) = present.get(&identity) else {
                continue;
            };
            for old in names.iter().filter(|n| **n != name) {
                let path = dir.join(old);
                if matches!(fs.try_stat(&path).await, Ok(Some(stat)) if stat.identity == identity)
                    && unlink(fs, &path, report).await
                {
                    report.removed += 1;
                }
            }
        }
    }

    report.skipped_missing += missing.len();
    Ok(projection)
}
