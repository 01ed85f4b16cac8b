use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use linkview_core::path::level_dir;
use linkview_core::{
    check_conflict, Conflict, EngineError, Filesystem, TagChain, TagQuery, ViewDefinition, ViewStore,
    VirtualLayout, Workspace,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::dedup::dedup_projection;
use crate::exclusivity::enforce_exclusivity;
use crate::plan::{generate, FileAssignment, PlanNode, PlanOptions, PlanOutcome};
use crate::project::project;
use crate::reconcile::{reconcile, remove_view_tree};
use crate::relink::{relink, MoveCapture};
use crate::report::PassReport;
use crate::walk::{find_links, prune_virtual_root};

/// Result of a save.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved {
        /// Directory of the view's full chain.
        virtual_path: PathBuf,
        /// Shorter views the save replaced.
        superseded: Vec<ViewDefinition>,
        report: PassReport,
    },
    /// A longer view already filters by this chain's prefix.
    Conflict(Conflict),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

/// Entry point for every view operation.
///
/// Holds the injected collaborators and the virtual layout and nothing else;
/// each call is a one-shot pass. Callers serialize calls per workspace.
pub struct ViewService {
    query: Arc<dyn TagQuery>,
    store: Arc<dyn ViewStore>,
    fs: Arc<dyn Filesystem>,
    layout: VirtualLayout,
}

impl ViewService {
    pub fn new(
        query: Arc<dyn TagQuery>,
        store: Arc<dyn ViewStore>,
        fs: Arc<dyn Filesystem>,
        layout: VirtualLayout,
    ) -> Self {
        ViewService {
            query,
            store,
            fs,
            layout,
        }
    }

    pub fn layout(&self) -> &VirtualLayout {
        &self.layout
    }

    pub fn virtual_root(&self, workspace: &Workspace) -> PathBuf {
        self.layout.virtual_root(workspace)
    }

    pub async fn list_views(&self, workspace: &Workspace) -> Result<Vec<ViewDefinition>, EngineError> {
        Ok(self.store.list_views(&workspace.id).await?)
    }

    /// The view that would block saving `chain`, if any.
    #[instrument(skip(self, workspace, chain), fields(workspace = %workspace.id, chain = %chain))]
    pub async fn check_conflict(
        &self,
        workspace: &Workspace,
        chain: &TagChain,
        exclude_view_id: Option<&str>,
    ) -> Result<Option<Conflict>, EngineError> {
        let views = self.store.list_views(&workspace.id).await?;
        Ok(check_conflict(chain, &views, exclude_view_id).blocking)
    }

    /// Persist a view and materialize it.
    ///
    /// Shorter views the new chain extends are deleted along with their
    /// trees. A longer view the chain is a prefix of blocks the save, which
    /// is reported as [`SaveOutcome::Conflict`] and changes nothing.
    #[instrument(skip(self, workspace, view), fields(workspace = %workspace.id, view = %view.id))]
    pub async fn save_view(
        &self,
        workspace: &Workspace,
        mut view: ViewDefinition,
    ) -> Result<SaveOutcome, EngineError> {
        check_workspace(workspace, &view)?;
        if view.name.trim().is_empty() {
            return Err(EngineError::InvalidName(view.name));
        }
        view.chain = TagChain::new(view.chain.selectors().to_vec());
        view.chain.validate()?;

        let all = self.store.list_views(&workspace.id).await?;
        let check = check_conflict(&view.chain, &all, Some(&view.id));
        if let Some(conflict) = check.blocking {
            info!(blocking = %conflict.blocking_view_id, "save rejected by longer view");
            return Ok(SaveOutcome::Conflict(conflict));
        }

        let previous = all.iter().find(|v| v.id == view.id).cloned();
        if let Some(existing) = &previous {
            view.created_at = existing.created_at;
        }
        view.updated_at = Utc::now();
        self.store.upsert_view(&view).await?;

        let mut report = PassReport::default();
        for superseded in &check.superseded {
            info!(superseded = %superseded.id, "deleting view replaced by longer chain");
            self.store.delete_view(&workspace.id, &superseded.id).await?;
        }
        let others: Vec<ViewDefinition> = all
            .into_iter()
            .filter(|v| v.id != view.id && !check.superseded.iter().any(|s| s.id == v.id))
            .collect();
        for superseded in &check.superseded {
            remove_view_tree(
                self.query.as_ref(),
                self.fs.as_ref(),
                &self.layout,
                workspace,
                superseded,
                &others,
                &mut report,
            )
            .await?;
        }

        if let Some(existing) = previous.filter(|p| !p.chain.same_as(&view.chain)) {
            info!(old = %existing.chain, new = %view.chain, "view chain changed, removing old tree");
            let mut remaining = others.clone();
            remaining.push(view.clone());
            remove_view_tree(
                self.query.as_ref(),
                self.fs.as_ref(),
                &self.layout,
                workspace,
                &existing,
                &remaining,
                &mut report,
            )
            .await?;
        }

        let virtual_root = self.ensure_virtual_root(workspace).await?;
        self.materialize(workspace, &view, &others, &mut report).await?;

        info!(%report, "view saved");
        Ok(SaveOutcome::Saved {
            virtual_path: level_dir(&virtual_root, view.chain.selectors()),
            superseded: check.superseded,
            report,
        })
    }

    /// Delete a view and the parts of its tree no other view uses.
    #[instrument(skip(self, workspace), fields(workspace = %workspace.id))]
    pub async fn delete_view(&self, workspace: &Workspace, view_id: &str) -> Result<PassReport, EngineError> {
        let view = self
            .store
            .get_view(&workspace.id, view_id)
            .await?
            .ok_or_else(|| EngineError::ViewNotFound(view_id.to_string()))?;

        self.store.delete_view(&workspace.id, view_id).await?;
        let remaining = self.store.list_views(&workspace.id).await?;

        let mut report = PassReport::default();
        remove_view_tree(
            self.query.as_ref(),
            self.fs.as_ref(),
            &self.layout,
            workspace,
            &view,
            &remaining,
            &mut report,
        )
        .await?;

        info!(%report, "view deleted");
        Ok(report)
    }

    /// Change a view's display name. Links are not touched.
    #[instrument(skip(self, workspace), fields(workspace = %workspace.id))]
    pub async fn rename_view(
        &self,
        workspace: &Workspace,
        view_id: &str,
        new_name: &str,
    ) -> Result<ViewDefinition, EngineError> {
        if new_name.trim().is_empty() {
            return Err(EngineError::InvalidName(new_name.to_string()));
        }
        let mut view = self
            .store
            .get_view(&workspace.id, view_id)
            .await?
            .ok_or_else(|| EngineError::ViewNotFound(view_id.to_string()))?;

        view.name = new_name.to_string();
        self.store.upsert_view(&view).await?;
        debug!(name = %view.name, "view renamed");
        Ok(view)
    }

    /// Remove stale links and empty directories from the whole virtual root.
    #[instrument(skip(self, workspace), fields(workspace = %workspace.id))]
    pub async fn reconcile_workspace(&self, workspace: &Workspace) -> Result<PassReport, EngineError> {
        let views = self.store.list_views(&workspace.id).await?;
        let plan_dirs = self.plan_dirs(workspace).await?;
        let mut report = PassReport::default();
        reconcile(
            self.query.as_ref(),
            self.fs.as_ref(),
            &self.layout,
            workspace,
            &views,
            &plan_dirs,
            &mut report,
        )
        .await?;
        info!(%report, "reconciled");
        Ok(report)
    }

    /// Re-materialize every view, oldest first, then reconcile.
    ///
    /// Replaying in `updated_at` order makes exclusivity land where the
    /// original sequence of saves left it.
    #[instrument(skip(self, workspace), fields(workspace = %workspace.id))]
    pub async fn materialize_all(&self, workspace: &Workspace) -> Result<PassReport, EngineError> {
        let views = self.store.list_views(&workspace.id).await?;
        let mut report = PassReport::default();
        self.ensure_virtual_root(workspace).await?;

        for view in &views {
            if let Err(e) = view.chain.validate() {
                warn!(view = %view.id, error = %e, "skipping view with invalid chain");
                continue;
            }
            let others: Vec<ViewDefinition> = views.iter().filter(|v| v.id != view.id).cloned().collect();
            if let Some(conflict) = check_conflict(&view.chain, &others, Some(&view.id)).blocking {
                warn!(view = %view.id, blocking = %conflict.blocking_view_id, "skipping view shadowed by a longer one");
                continue;
            }
            self.materialize(workspace, view, &others, &mut report).await?;
        }

        let plan_dirs = self.plan_dirs(workspace).await?;
        reconcile(
            self.query.as_ref(),
            self.fs.as_ref(),
            &self.layout,
            workspace,
            &views,
            &plan_dirs,
            &mut report,
        )
        .await?;
        info!(views = views.len(), %report, "workspace materialized");
        Ok(report)
    }

    /// Record a file's identity and links before it is moved.
    #[instrument(skip(self, workspace, current_path), fields(workspace = %workspace.id, path = %current_path.display()))]
    pub async fn capture_before_move(
        &self,
        workspace: &Workspace,
        file_id: &str,
        current_path: &Path,
    ) -> Result<MoveCapture, EngineError> {
        if self.query.file(file_id).await?.is_none() {
            return Err(EngineError::FileNotFound(file_id.to_string()));
        }
        let stat = match self.fs.stat(current_path).await {
            Ok(stat) => stat,
            Err(e) if e.is_not_found() => return Err(EngineError::FileNotFound(file_id.to_string())),
            Err(e) => return Err(e.into()),
        };

        let mut report = PassReport::default();
        let link_paths = find_links(
            self.fs.as_ref(),
            &self.layout,
            &self.virtual_root(workspace),
            stat.identity,
            &mut report,
        )
        .await;
        debug!(links = link_paths.len(), identity = %stat.identity, "captured before move");

        Ok(MoveCapture {
            file_id: file_id.to_string(),
            old_path: current_path.to_path_buf(),
            old_identity: stat.identity,
            link_paths,
        })
    }

    /// Re-point the links recorded in `capture` at `new_path`.
    #[instrument(skip(self, workspace, capture, new_path), fields(workspace = %workspace.id, file_id = %capture.file_id, path = %new_path.display()))]
    pub async fn relink_after_move(
        &self,
        workspace: &Workspace,
        capture: &MoveCapture,
        new_path: &Path,
    ) -> Result<PassReport, EngineError> {
        let stat = match self.fs.stat(new_path).await {
            Ok(stat) => stat,
            Err(e) if e.is_not_found() => return Err(EngineError::FileNotFound(capture.file_id.clone())),
            Err(e) => return Err(e.into()),
        };

        let mut report = PassReport::default();
        if stat.identity != capture.old_identity {
            debug!(workspace = %workspace.id, old = %capture.old_identity, new = %stat.identity, "identity changed");
        }
        relink(self.fs.as_ref(), capture, new_path, stat.identity, &mut report).await;
        info!(%report, "relinked after move");
        Ok(report)
    }

    /// Materialize an externally computed folder tree.
    #[instrument(skip(self, workspace, tree, assignments), fields(workspace = %workspace.id, files = assignments.len()))]
    pub async fn generate_from_plan(
        &self,
        workspace: &Workspace,
        tree: &[PlanNode],
        assignments: &[FileAssignment],
        options: PlanOptions,
    ) -> Result<PlanOutcome, EngineError> {
        let virtual_root = self.ensure_virtual_root(workspace).await?;
        let mut report = PassReport::default();
        let (linked_count, dirs) = generate(
            self.query.as_ref(),
            self.fs.as_ref(),
            &self.layout,
            &virtual_root,
            tree,
            assignments,
            options,
            &mut report,
        )
        .await?;
        self.store.add_plan_dirs(&workspace.id, &dirs).await?;
        prune_virtual_root(self.fs.as_ref(), &self.layout, &virtual_root, &mut report).await;

        info!(linked_count, folders = dirs.len(), %report, "plan generated");
        Ok(PlanOutcome { linked_count, report })
    }

    /// Project, deduplicate and take exclusive ownership for one view.
    async fn materialize(
        &self,
        workspace: &Workspace,
        view: &ViewDefinition,
        others: &[ViewDefinition],
        report: &mut PassReport,
    ) -> Result<(), EngineError> {
        let fs = self.fs.as_ref();
        let virtual_root = self.virtual_root(workspace);

        let neighbours: Vec<&TagChain> = others
            .iter()
            .filter(|other| other.id != view.id)
            .map(|other| &other.chain)
            .collect();
        let projection = project(
            self.query.as_ref(),
            fs,
            &workspace.id,
            &virtual_root,
            &view.chain,
            &neighbours,
            report,
        )
        .await?;
        dedup_projection(fs, &projection, report).await;

        let rivals: Vec<&ViewDefinition> = others
            .iter()
            .filter(|other| other.id != view.id && !other.chain.same_as(&view.chain))
            .collect();
        enforce_exclusivity(
            self.query.as_ref(),
            fs,
            &self.layout,
            &workspace.id,
            &virtual_root,
            &rivals,
            &projection,
            report,
        )
        .await?;
        prune_virtual_root(fs, &self.layout, &virtual_root, report).await;
        debug!(view = %view.id, captured = projection.captured.len(), "view materialized");
        Ok(())
    }

    /// Absolute paths of the folders plan output was written to.
    pub async fn plan_dirs(&self, workspace: &Workspace) -> Result<HashSet<PathBuf>, EngineError> {
        let virtual_root = self.virtual_root(workspace);
        Ok(self
            .store
            .plan_dirs(&workspace.id)
            .await?
            .into_iter()
            .map(|rel| {
                if rel.as_os_str().is_empty() {
                    virtual_root.clone()
                } else {
                    virtual_root.join(rel)
                }
            })
            .collect())
    }

    /// Create the virtual root and its marker file.
    ///
    /// Only the root itself is fatal; a marker that cannot be written is
    /// logged and retried on the next pass.
    async fn ensure_virtual_root(&self, workspace: &Workspace) -> Result<PathBuf, EngineError> {
        let virtual_root = self.virtual_root(workspace);
        self.fs
            .mkdir_all(&virtual_root)
            .await
            .map_err(|source| EngineError::Setup {
                path: virtual_root.clone(),
                source,
            })?;

        let marker = self.layout.marker_path(workspace);
        match self.fs.write_new(&marker, self.layout.marker_text().as_bytes()).await {
            Ok(()) => debug!(path = %marker.display(), "wrote marker"),
            Err(e) if e.is_already_exists() => {}
            Err(e) => warn!(path = %marker.display(), error = %e, "failed to write marker"),
        }
        Ok(virtual_root)
    }
}

fn check_workspace(workspace: &Workspace, view: &ViewDefinition) -> Result<(), EngineError> {
    if view.workspace_id != workspace.id {
        return Err(EngineError::WorkspaceMismatch {
            view_id: view.id.clone(),
            expected: workspace.id.clone(),
            actual: view.workspace_id.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkview_core::{FsError, TagSelector};
    use linkview_fs::MemoryFs;
    use linkview_store::{Catalog, MemoryCatalog};

    fn service(fs: Arc<MemoryFs>, catalog: Arc<MemoryCatalog>) -> ViewService {
        ViewService::new(catalog.clone(), catalog, fs, VirtualLayout::default())
    }

    fn doc_chain() -> TagChain {
        TagChain::new(vec![TagSelector::new(1, "Genre", "Doc")])
    }

    #[tokio::test]
    async fn test_save_writes_marker_once() {
        let fs = Arc::new(MemoryFs::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let svc = service(fs.clone(), catalog);
        let ws = Workspace::new("ws", "/ws");

        let outcome = svc
            .save_view(&ws, ViewDefinition::new("v", "ws", "Docs", doc_chain()))
            .await
            .unwrap();
        assert!(outcome.is_saved());
        let marker = "/ws/.linkview/_ABOUT_LINKVIEW.en.txt";
        let first = fs.identity(marker).unwrap();

        svc.save_view(&ws, ViewDefinition::new("v", "ws", "Docs", doc_chain()))
            .await
            .unwrap();
        assert_eq!(fs.identity(marker), Some(first));
    }

    #[tokio::test]
    async fn test_setup_failure_propagates() {
        let fs = Arc::new(MemoryFs::new());
        fs.mkdir_all(Path::new("/ws")).await.unwrap();
        fs.set_read_only("/ws");
        let svc = service(fs, Arc::new(MemoryCatalog::new()));

        let err = svc
            .save_view(&Workspace::new("ws", "/ws"), ViewDefinition::new("v", "ws", "Docs", doc_chain()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Setup {
                source: FsError::PermissionDenied(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let svc = service(Arc::new(MemoryFs::new()), Arc::new(MemoryCatalog::new()));
        let ws = Workspace::new("ws", "/ws");

        let err = svc
            .save_view(&ws, ViewDefinition::new("v", "other", "Docs", doc_chain()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkspaceMismatch { .. }));

        let err = svc
            .save_view(&ws, ViewDefinition::new("v", "ws", "Empty", TagChain::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidChain(_)));

        let err = svc
            .save_view(&ws, ViewDefinition::new("v", "ws", "  ", doc_chain()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidName(_)));

        assert!(matches!(
            svc.delete_view(&ws, "nope").await.unwrap_err(),
            EngineError::ViewNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_rename_is_metadata_only() {
        let fs = Arc::new(MemoryFs::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let genre = catalog.add_dimension("Genre").unwrap();
        fs.create_file("/ws/a.txt", b"a").unwrap();
        let a = catalog.add_file("ws", Path::new("/ws/a.txt"), None).unwrap();
        catalog.tag_file(&a, genre.id, "Doc").unwrap();

        let svc = service(fs.clone(), catalog.clone());
        let ws = Workspace::new("ws", "/ws");
        svc.save_view(&ws, ViewDefinition::new("v", "ws", "Docs", doc_chain()))
            .await
            .unwrap();
        let before = fs.files_under("/ws/.linkview");

        let renamed = svc.rename_view(&ws, "v", "Documents").await.unwrap();
        assert_eq!(renamed.name, "Documents");
        assert_eq!(fs.files_under("/ws/.linkview"), before);
        assert_eq!(
            catalog.get_view("ws", "v").await.unwrap().unwrap().name,
            "Documents"
        );
    }

    #[tokio::test]
    async fn test_check_conflict_excludes_self() {
        let catalog = Arc::new(MemoryCatalog::new());
        let svc = service(Arc::new(MemoryFs::new()), catalog.clone());
        let ws = Workspace::new("ws", "/ws");
        let long = TagChain::new(vec![
            TagSelector::new(1, "Genre", "Doc"),
            TagSelector::new(2, "Format", "PDF"),
        ]);
        catalog
            .upsert_view(&ViewDefinition::new("long", "ws", "PDFs", long))
            .await
            .unwrap();

        let conflict = svc.check_conflict(&ws, &doc_chain(), None).await.unwrap().unwrap();
        assert_eq!(conflict.blocking_view_id, "long");
        assert!(svc
            .check_conflict(&ws, &doc_chain(), Some("long"))
            .await
            .unwrap()
            .is_none());
    }
}
