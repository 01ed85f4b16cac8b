mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use defaults::{
    DEFAULT_MARKER_LANGUAGE, DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_THUMBNAIL_DIR,
    DEFAULT_VIRTUAL_DIR,
};
pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("Invalid workspace root for '{0}': {1}")]
    InvalidWorkspaceRoot(String, String),

    #[error("Duplicate workspace root: {0}")]
    DuplicateWorkspaceRoot(String),

    #[error("Workspace '{1}' is nested inside workspace '{0}'")]
    NestedWorkspaces(String, String),

    #[error("Invalid {0}: {1}")]
    InvalidDirName(String, String),

    #[error("Unsupported marker language '{0}'. Supported: en, de, fr, es, zh, ja")]
    UnsupportedLanguage(String),

    #[error("Unknown workspace '{0}'. Check the workspaces section of linkview.yaml.")]
    UnknownWorkspace(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LinkviewConfig {
    /// Parse a configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: LinkviewConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look up a workspace by id.
    pub fn workspace(&self, id: &str) -> Result<&WorkspaceConfig, ConfigError> {
        self.workspaces
            .get(id)
            .ok_or_else(|| ConfigError::UnknownWorkspace(id.to_string()))
    }
}
