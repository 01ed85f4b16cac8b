use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use linkview_core::{QualifyingFile, StoreError, TagQuery, TagSelector, ViewDefinition, ViewStore};

use crate::{check_dimension_name, check_tag_value, Catalog, Dimension, FileRecord};

#[derive(Debug, Default)]
struct State {
    dimensions: Vec<Dimension>,
    files: BTreeMap<String, FileRecord>,
    views: HashMap<(String, String), ViewDefinition>,
    plan_dirs: HashMap<String, BTreeSet<PathBuf>>,
    next_file: u64,
}

impl State {
    fn file_mut(&mut self, file_id: &str) -> Result<&mut FileRecord, StoreError> {
        self.files
            .get_mut(file_id)
            .ok_or_else(|| StoreError::NotFound(format!("file '{}'", file_id)))
    }

    fn dimension(&self, dimension_id: i64) -> Result<&Dimension, StoreError> {
        self.dimensions
            .iter()
            .find(|d| d.id == dimension_id)
            .ok_or_else(|| StoreError::NotFound(format!("dimension {}", dimension_id)))
    }
}

/// In-memory catalog for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<State>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_qualifying(record: &FileRecord) -> QualifyingFile {
    QualifyingFile {
        file_id: record.id.clone(),
        path: record.path.clone(),
        display_name: record.display_name.clone(),
    }
}

impl Catalog for MemoryCatalog {
    fn add_dimension(&self, name: &str) -> Result<Dimension, StoreError> {
        check_dimension_name(name)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = state.dimensions.iter().find(|d| d.name == name) {
            return Ok(existing.clone());
        }
        let dimension = Dimension {
            id: state.dimensions.len() as i64 + 1,
            name: name.to_string(),
        };
        state.dimensions.push(dimension.clone());
        Ok(dimension)
    }

    fn dimensions(&self) -> Result<Vec<Dimension>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.dimensions.clone())
    }

    fn add_file(
        &self,
        workspace_id: &str,
        path: &Path,
        display_name: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state
            .files
            .values()
            .any(|f| f.workspace_id == workspace_id && f.path == path)
        {
            return Err(StoreError::InvalidInput(format!(
                "file already registered: {}",
                path.display()
            )));
        }
        state.next_file += 1;
        let id = format!("f{:06}", state.next_file);
        state.files.insert(
            id.clone(),
            FileRecord {
                id: id.clone(),
                workspace_id: workspace_id.to_string(),
                path: path.to_path_buf(),
                display_name: display_name.map(str::to_string),
                eligible: true,
                tags: Vec::new(),
            },
        );
        Ok(id)
    }

    fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.files.get(file_id).cloned())
    }

    fn list_files(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .files
            .values()
            .filter(|f| f.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    fn tag_file(&self, file_id: &str, dimension_id: i64, value: &str) -> Result<(), StoreError> {
        check_tag_value(value)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let name = state.dimension(dimension_id)?.name.clone();
        let file = state.file_mut(file_id)?;
        let selector = TagSelector::new(dimension_id, name, value);
        if !file.tags.iter().any(|t| t.matches(&selector)) {
            file.tags.push(selector);
            file.tags.sort_by(|a, b| {
                (a.dimension_id, &a.tag_value).cmp(&(b.dimension_id, &b.tag_value))
            });
        }
        Ok(())
    }

    fn untag_file(&self, file_id: &str, dimension_id: i64) -> Result<usize, StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let file = state.file_mut(file_id)?;
        let before = file.tags.len();
        file.tags.retain(|t| t.dimension_id != dimension_id);
        Ok(before - file.tags.len())
    }

    fn set_path(&self, file_id: &str, path: &Path) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.file_mut(file_id)?.path = path.to_path_buf();
        Ok(())
    }

    fn set_eligible(&self, file_id: &str, eligible: bool) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.file_mut(file_id)?.eligible = eligible;
        Ok(())
    }

    fn remove_file(&self, file_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        Ok(state.files.remove(file_id).is_some())
    }
}

#[async_trait]
impl TagQuery for MemoryCatalog {
    async fn list_qualifying_files(
        &self,
        workspace_id: &str,
        prefix: &[TagSelector],
    ) -> Result<Vec<QualifyingFile>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .files
            .values()
            .filter(|f| f.workspace_id == workspace_id && f.eligible && f.qualifies(prefix))
            .map(to_qualifying)
            .collect())
    }

    async fn file(&self, file_id: &str) -> Result<Option<QualifyingFile>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.files.get(file_id).map(to_qualifying))
    }
}

#[async_trait]
impl ViewStore for MemoryCatalog {
    async fn get_view(
        &self,
        workspace_id: &str,
        view_id: &str,
    ) -> Result<Option<ViewDefinition>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .views
            .get(&(workspace_id.to_string(), view_id.to_string()))
            .cloned())
    }

    async fn list_views(&self, workspace_id: &str) -> Result<Vec<ViewDefinition>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut views: Vec<ViewDefinition> = state
            .views
            .values()
            .filter(|v| v.workspace_id == workspace_id)
            .cloned()
            .collect();
        views.sort_by(|a, b| {
            (a.updated_at, a.created_at, &a.id).cmp(&(b.updated_at, b.created_at, &b.id))
        });
        Ok(views)
    }

    async fn upsert_view(&self, view: &ViewDefinition) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .views
            .insert((view.workspace_id.clone(), view.id.clone()), view.clone());
        Ok(())
    }

    async fn delete_view(&self, workspace_id: &str, view_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .views
            .remove(&(workspace_id.to_string(), view_id.to_string()))
            .is_some())
    }

    async fn plan_dirs(&self, workspace_id: &str) -> Result<Vec<PathBuf>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .plan_dirs
            .get(workspace_id)
            .map(|dirs| dirs.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_plan_dirs(&self, workspace_id: &str, dirs: &[PathBuf]) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .plan_dirs
            .entry(workspace_id.to_string())
            .or_default()
            .extend(dirs.iter().cloned());
        Ok(())
    }
}
