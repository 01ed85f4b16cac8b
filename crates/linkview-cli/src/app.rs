use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use linkview_config::LinkviewConfig;
use linkview_core::{TagChain, VirtualLayout, Workspace};
use linkview_engine::ViewService;
use linkview_fs::LocalFs;
use linkview_store::{Catalog, SqliteCatalog};

/// Everything a command needs, built once from the configuration.
pub struct App {
    pub config: LinkviewConfig,
    pub catalog: Arc<SqliteCatalog>,
    pub fs: Arc<LocalFs>,
    pub service: ViewService,
}

impl App {
    pub fn open(config_path: &Path) -> Result<Self, Box<dyn Error>> {
        let config = LinkviewConfig::from_file(config_path)?.effective();
        config.validate_or_err()?;

        let database = config
            .database
            .as_deref()
            .ok_or("No database configured. Set `database` or add a workspace")?;
        let database = PathBuf::from(database);
        if let Some(parent) = database.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let catalog = Arc::new(SqliteCatalog::open(&database)?);

        let fs = Arc::new(LocalFs::confined_to(
            config.workspaces.values().map(|ws| PathBuf::from(&ws.root)),
        ));
        let service = ViewService::new(
            catalog.clone(),
            catalog.clone(),
            fs.clone(),
            VirtualLayout::from(&config),
        );

        Ok(App {
            config,
            catalog,
            fs,
            service,
        })
    }

    pub fn workspace(&self, id: &str) -> Result<Workspace, Box<dyn Error>> {
        let ws = self.config.workspace(id)?;
        Ok(Workspace::new(id, &ws.root))
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.config
            .workspaces
            .iter()
            .map(|(id, ws)| Workspace::new(id.as_str(), &ws.root))
            .collect()
    }

    /// The workspace whose root contains `path`.
    pub fn workspace_for_path(&self, path: &Path) -> Result<Workspace, Box<dyn Error>> {
        self.workspaces()
            .into_iter()
            .filter(|ws| path.starts_with(&ws.root))
            .max_by_key(|ws| ws.root.components().count())
            .ok_or_else(|| format!("{} is not inside a configured workspace", path.display()).into())
    }

    /// Resolve `dimension=value` arguments into a chain.
    pub fn chain(&self, selectors: &[String]) -> Result<TagChain, Box<dyn Error>> {
        let mut chain = Vec::with_capacity(selectors.len());
        for arg in selectors {
            let (dimension, value) = parse_tag(arg)?;
            chain.push(self.catalog.selector(dimension, value)?);
        }
        Ok(TagChain::new(chain))
    }
}

/// Split `dimension=value`.
pub fn parse_tag(arg: &str) -> Result<(&str, &str), String> {
    match arg.split_once('=') {
        Some((dimension, value)) if !dimension.trim().is_empty() && !value.trim().is_empty() => {
            Ok((dimension.trim(), value.trim()))
        }
        _ => Err(format!("expected dimension=value, got '{}'", arg)),
    }
}

/// Make `path` absolute against the current directory.
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
