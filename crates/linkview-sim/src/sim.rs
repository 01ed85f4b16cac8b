use std::path::{Path, PathBuf};
use std::sync::Arc;

use linkview_core::{EngineError, Filesystem, TagChain, TagSelector, ViewDefinition, VirtualLayout, Workspace};
use linkview_engine::{SaveOutcome, ViewService};
use linkview_fs::MemoryFs;
use linkview_store::{Catalog, Dimension, MemoryCatalog};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::fault::{FaultConfig, FaultStats, FaultyFs};
use crate::invariants::{check_final_consistency, check_step_invariants, snapshot, Violation};
use crate::ops::{generate, tag_value, Op, OpState, DIMENSIONS};

const WORKSPACE_ROOT: &str = "/ws";

/// A single operation/result entry captured during simulation.
#[derive(Debug, Clone)]
pub struct SimTraceEntry {
    pub step: usize,
    pub op: String,
    pub outcome: String,
}

/// The main simulation harness.
///
/// Sources live in a [`MemoryFs`] the harness mutates directly; the engine
/// sees the same filesystem, optionally through a [`FaultyFs`].
pub struct Sim {
    pub fs: Arc<MemoryFs>,
    pub faults: Option<Arc<FaultyFs>>,
    pub catalog: Arc<MemoryCatalog>,
    pub service: ViewService,
    pub layout: VirtualLayout,
    pub workspace: Workspace,
    pub dimensions: Vec<Dimension>,
    pub rng: ChaCha8Rng,
    pub state: OpState,
    pub step: usize,
    pub violations: Vec<Violation>,
    pub trace: Vec<SimTraceEntry>,
}

impl Sim {
    /// Create a new deterministic simulation with the given seed.
    pub fn new(seed: u64) -> Self {
        Self::new_with_faults(seed, None)
    }

    /// Create a new deterministic simulation with optional fault injection.
    pub fn new_with_faults(seed: u64, fault_config: Option<FaultConfig>) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let fs = Arc::new(MemoryFs::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let layout = VirtualLayout::default();

        let faults = fault_config.map(|config| {
            let fault_rng = ChaCha8Rng::seed_from_u64(rand::Rng::gen(&mut rng));
            Arc::new(FaultyFs::new(fs.clone(), fault_rng, config))
        });
        let engine_fs: Arc<dyn Filesystem> = match &faults {
            Some(faulty) => faulty.clone(),
            None => fs.clone(),
        };
        let service = ViewService::new(catalog.clone(), catalog.clone(), engine_fs, layout.clone());

        let dimensions = DIMENSIONS
            .iter()
            .filter_map(|name| catalog.add_dimension(name).ok())
            .collect();

        Sim {
            fs,
            faults,
            catalog,
            service,
            layout,
            workspace: Workspace::new("ws", WORKSPACE_ROOT),
            dimensions,
            rng,
            state: OpState::default(),
            step: 0,
            violations: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn has_faults(&self) -> bool {
        self.faults.is_some()
    }

    pub fn fault_stats(&self) -> FaultStats {
        self.faults
            .as_ref()
            .map(|f| f.stats())
            .unwrap_or(FaultStats { fault_count: 0 })
    }

    /// Run `steps` random operations, then settle and check the final tree.
    pub async fn run(&mut self, steps: usize) -> &[Violation] {
        for _ in 0..steps {
            let op = generate(&mut self.rng, &mut self.state);
            let _ = self.step_with(op).await;
        }
        self.settle().await;
        &self.violations
    }

    /// Apply one operation and check the per-step invariants.
    pub async fn step_with(&mut self, op: Op) -> Vec<Violation> {
        self.step += 1;
        let step = self.step;
        let label = format!("{:?}", op);

        let outcome = match self.apply(op).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if !self.has_faults() {
                    self.violations.push(Violation {
                        step,
                        invariant: "operation-succeeds".to_string(),
                        details: format!("{}: {}", label, e),
                    });
                }
                format!("error: {}", e)
            }
        };
        debug!(step, op = %label, %outcome, "sim step");
        self.trace.push(SimTraceEntry {
            step,
            op: label,
            outcome,
        });

        let views = self.refresh_views().await;
        let violations = check_step_invariants(step, &views);
        self.violations.extend(violations.clone());
        violations
    }

    /// Stop injecting faults, materialize everything and check the result.
    ///
    /// A second pass over the settled tree must not change it.
    pub async fn settle(&mut self) -> Vec<Violation> {
        if let Some(faults) = &self.faults {
            faults.disable();
        }
        self.step += 1;
        let step = self.step;
        let virtual_root = self.layout.virtual_root(&self.workspace);

        if let Err(e) = self.service.materialize_all(&self.workspace).await {
            self.violations.push(Violation {
                step,
                invariant: "settle-succeeds".to_string(),
                details: e.to_string(),
            });
        }
        let views = self.refresh_views().await;
        let plan_dirs = match self.service.plan_dirs(&self.workspace).await {
            Ok(dirs) => dirs,
            Err(e) => {
                self.violations.push(Violation {
                    step,
                    invariant: "catalog-readable".to_string(),
                    details: e.to_string(),
                });
                Default::default()
            }
        };
        let mut violations = check_final_consistency(
            step,
            self.fs.as_ref(),
            self.catalog.as_ref(),
            &self.layout,
            &self.workspace,
            &views,
            &plan_dirs,
        )
        .await;

        let settled = snapshot(&self.fs, &virtual_root);
        match self.service.materialize_all(&self.workspace).await {
            Ok(_) if snapshot(&self.fs, &virtual_root) != settled => violations.push(Violation {
                step,
                invariant: "settle-idempotent".to_string(),
                details: "a second pass changed the tree".to_string(),
            }),
            Ok(_) => {}
            Err(e) => violations.push(Violation {
                step,
                invariant: "settle-succeeds".to_string(),
                details: e.to_string(),
            }),
        }
        match self.service.reconcile_workspace(&self.workspace).await {
            Ok(report) if report.changes() > 0 => violations.push(Violation {
                step,
                invariant: "reconcile-idempotent".to_string(),
                details: format!("reconcile of a settled tree changed it: {}", report),
            }),
            Ok(_) => {}
            Err(e) => violations.push(Violation {
                step,
                invariant: "settle-succeeds".to_string(),
                details: e.to_string(),
            }),
        }

        self.violations.extend(violations.clone());
        violations
    }

    async fn refresh_views(&mut self) -> Vec<ViewDefinition> {
        let views = self.service.list_views(&self.workspace).await.unwrap_or_default();
        self.state.view_ids = views.iter().map(|v| v.id.clone()).collect();
        views
    }

    fn selector(&self, dim: usize, value: usize) -> TagSelector {
        let dimension = &self.dimensions[dim];
        TagSelector::new(dimension.id, dimension.name.clone(), tag_value(dim, value))
    }

    async fn apply(&mut self, op: Op) -> Result<String, EngineError> {
        match op {
            Op::AddFile { name, tags } => {
                let path = PathBuf::from(WORKSPACE_ROOT).join(&name);
                self.fs.create_file(&path, name.as_bytes())?;
                let id = self.catalog.add_file(&self.workspace.id, &path, None)?;
                for (dim, value) in tags {
                    let selector = self.selector(dim, value);
                    self.catalog.tag_file(&id, selector.dimension_id, &selector.tag_value)?;
                }
                self.state.files.insert(id.clone(), path);
                Ok(format!("added {}", id))
            }
            Op::Tag { file_id, dim, value } => {
                let selector = self.selector(dim, value);
                self.catalog.tag_file(&file_id, selector.dimension_id, &selector.tag_value)?;
                Ok(format!("tagged {} {}", file_id, selector))
            }
            Op::Untag { file_id, dim } => {
                let removed = self.catalog.untag_file(&file_id, self.dimensions[dim].id)?;
                Ok(format!("untagged {} ({})", file_id, removed))
            }
            Op::SetEligible { file_id, eligible } => {
                self.catalog.set_eligible(&file_id, eligible)?;
                Ok(format!("{} eligible={}", file_id, eligible))
            }
            Op::RemoveSource { file_id } => {
                if let Some(path) = self.state.files.remove(&file_id) {
                    self.fs.remove(&path).await?;
                }
                self.catalog.remove_file(&file_id)?;
                Ok(format!("removed {}", file_id))
            }
            Op::MoveFile { file_id, copy } => self.move_file(&file_id, copy).await,
            Op::SaveView { view_id, chain } => {
                let chain = TagChain::new(chain.into_iter().map(|(d, v)| self.selector(d, v)).collect());
                let view = ViewDefinition::new(view_id.clone(), self.workspace.id.clone(), view_id, chain);
                match self.service.save_view(&self.workspace, view).await? {
                    SaveOutcome::Saved { report, superseded, .. } => Ok(format!(
                        "saved, superseded {}, {}",
                        superseded.len(),
                        report
                    )),
                    SaveOutcome::Conflict(conflict) => Ok(format!("rejected: {}", conflict)),
                }
            }
            Op::DeleteView { view_id } => {
                let report = self.service.delete_view(&self.workspace, &view_id).await?;
                Ok(format!("deleted {}, {}", view_id, report))
            }
            Op::RenameView { view_id, name } => {
                let view = self.service.rename_view(&self.workspace, &view_id, &name).await?;
                Ok(format!("renamed {} to {}", view.id, view.name))
            }
            Op::Reconcile => {
                let report = self.service.reconcile_workspace(&self.workspace).await?;
                Ok(format!("reconciled, {}", report))
            }
            Op::MaterializeAll => {
                let report = self.service.materialize_all(&self.workspace).await?;
                Ok(format!("materialized, {}", report))
            }
        }
    }

    /// Move a source the way a physical re-organization pass would.
    async fn move_file(&mut self, file_id: &str, copy: bool) -> Result<String, EngineError> {
        let Some(old_path) = self.state.files.get(file_id).cloned() else {
            return Ok("unknown file".to_string());
        };
        let name = old_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        let new_path = Path::new(WORKSPACE_ROOT).join(self.state.next_move_dir()).join(name);

        let capture = self
            .service
            .capture_before_move(&self.workspace, file_id, &old_path)
            .await?;

        if copy {
            let content = self.fs.read(&old_path).unwrap_or_default();
            self.fs.create_file(&new_path, &content)?;
            self.fs.remove(&old_path).await?;
        } else {
            self.fs.move_file(&old_path, &new_path)?;
        }
        self.catalog.set_path(file_id, &new_path)?;
        self.state.files.insert(file_id.to_string(), new_path.clone());

        let report = self
            .service
            .relink_after_move(&self.workspace, &capture, &new_path)
            .await?;
        Ok(format!(
            "moved {} to {} ({} links), {}",
            file_id,
            new_path.display(),
            capture.link_paths.len(),
            report
        ))
    }
}
