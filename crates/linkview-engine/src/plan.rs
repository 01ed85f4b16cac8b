//! Materialization of an externally computed folder tree.
//!
//! A plan names folders and says which file goes where. The folders are not
//! derived from tag chains, but links are placed, deduplicated and pruned
//! with the same primitives views use.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use linkview_core::path::check_path_component;
use linkview_core::{EngineError, Filesystem, QualifyingFile, TagQuery, VirtualLayout};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::dedup::dedup_chain;
use crate::links::place_link;
use crate::project::resolve_links;
use crate::report::PassReport;

/// One folder of a plan tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(name: impl Into<String>) -> Self {
        PlanNode {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<PlanNode>) -> Self {
        self.children = children;
        self
    }
}

/// Place file `file_id` in the folder reached by following `target` names
/// from the top of the tree. An empty target means the virtual root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAssignment {
    pub file_id: String,
    #[serde(default)]
    pub target: Vec<String>,
}

impl FileAssignment {
    pub fn new<I, S>(file_id: impl Into<String>, target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FileAssignment {
            file_id: file_id.into(),
            target: target.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Link every assigned file directly into the virtual root.
    #[serde(default)]
    pub flatten: bool,
}

/// A plan as read from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPlan {
    #[serde(default)]
    pub tree: Vec<PlanNode>,
    #[serde(default)]
    pub assignments: Vec<FileAssignment>,
    #[serde(default)]
    pub options: PlanOptions,
}

impl GenerationPlan {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidPlan(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanOutcome {
    /// Assigned files that are linked after the pass.
    pub linked_count: usize,
    pub report: PassReport,
}

/// Folder paths of a validated tree, relative to the virtual root.
#[derive(Debug, Default)]
struct TreeShape {
    dirs: HashSet<PathBuf>,
    /// Root-to-leaf folder chains.
    chains: Vec<Vec<PathBuf>>,
}

fn shape_of(tree: &[PlanNode]) -> Result<TreeShape, EngineError> {
    let mut shape = TreeShape::default();
    let mut pending: Vec<(&PlanNode, Vec<PathBuf>)> = tree.iter().map(|n| (n, Vec::new())).collect();

    while let Some((node, mut ancestors)) = pending.pop() {
        check_path_component(&node.name)
            .map_err(|reason| EngineError::InvalidPlan(format!("folder '{}': {}", node.name, reason)))?;

        let rel = match ancestors.last() {
            Some(parent) => parent.join(&node.name),
            None => PathBuf::from(&node.name),
        };
        if !shape.dirs.insert(rel.clone()) {
            return Err(EngineError::InvalidPlan(format!(
                "folder '{}' appears twice",
                rel.display()
            )));
        }

        ancestors.push(rel);
        if node.children.is_empty() {
            shape.chains.push(ancestors);
        } else {
            pending.extend(node.children.iter().map(|child| (child, ancestors.clone())));
        }
    }

    Ok(shape)
}

/// Drop targets that are an ancestor of another target of the same file.
fn deepest_targets(targets: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut deepest: Vec<PathBuf> = targets
        .iter()
        .filter(|t| !targets.iter().any(|other| other != *t && other.starts_with(t)))
        .cloned()
        .collect();
    deepest.sort();
    deepest.dedup();
    deepest
}

/// Link every assigned file into its plan folders.
///
/// Returns the number of links placed and the folders, relative to
/// `virtual_root`, that received links.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn generate(
    query: &dyn TagQuery,
    fs: &dyn Filesystem,
    layout: &VirtualLayout,
    virtual_root: &Path,
    tree: &[PlanNode],
    assignments: &[FileAssignment],
    options: PlanOptions,
    report: &mut PassReport,
) -> Result<(usize, Vec<PathBuf>), EngineError> {
    let shape = shape_of(tree)?;

    let mut targets: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for assignment in assignments {
        targets
            .entry(assignment.file_id.as_str())
            .or_default()
            .push(assignment.target.iter().collect());
    }

    let mut missing = HashSet::new();
    let mut by_dir: BTreeMap<PathBuf, Vec<QualifyingFile>> = BTreeMap::new();
    for (file_id, rels) in targets {
        let Some(file) = query.file(file_id).await? else {
            warn!(file_id, "assigned file is not in the catalog");
            missing.insert(file_id.to_string());
            continue;
        };
        if options.flatten {
            by_dir.entry(PathBuf::new()).or_default().push(file);
            continue;
        }

        let mut known = Vec::with_capacity(rels.len());
        for rel in rels {
            if rel.as_os_str().is_empty() || shape.dirs.contains(&rel) {
                known.push(rel);
            } else {
                warn!(file_id, target = %rel.display(), "target folder is not in the plan");
                report.failed += 1;
            }
        }
        for rel in deepest_targets(known) {
            by_dir.entry(rel).or_default().push(file.clone());
        }
    }

    let mut linked = 0;
    let used: Vec<PathBuf> = by_dir.keys().cloned().collect();
    for (rel, files) in by_dir {
        let dir = virtual_root.join(&rel);
        if let Err(e) = fs.mkdir_all(&dir).await {
            error!(dir = %dir.display(), error = %e, "failed to create plan folder");
            report.failed += files.len();
            continue;
        }
        debug!(dir = %dir.display(), files = files.len(), "linking plan folder");
        for link in resolve_links(fs, files, &mut missing).await {
            if place_link(fs, &link.source, link.identity, &dir.join(&link.name), report).await {
                linked += 1;
            }
        }
    }

    if !options.flatten {
        for chain in &shape.chains {
            let dirs: Vec<PathBuf> = chain.iter().map(|rel| virtual_root.join(rel)).collect();
            dedup_chain(fs, layout, &dirs, report).await;
        }
    }

    report.skipped_missing += missing.len();
    Ok((linked, used))
}
