use std::collections::HashSet;
use std::path::{Component, Path};

use crate::types::{LinkviewConfig, SUPPORTED_LANGUAGES};
use crate::ConfigError;

impl LinkviewConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Some(ref dir) = self.virtual_dir {
            if let Err(reason) = check_single_component(dir) {
                errors.push(ConfigError::InvalidDirName("virtual_dir".to_string(), reason));
            }
        }
        if let Some(ref dir) = self.thumbnail_dir {
            if let Err(reason) = check_single_component(dir) {
                errors.push(ConfigError::InvalidDirName("thumbnail_dir".to_string(), reason));
            }
        }

        if let Some(ref lang) = self.marker_language {
            if !SUPPORTED_LANGUAGES.contains(&lang.as_str()) {
                errors.push(ConfigError::UnsupportedLanguage(lang.clone()));
            }
        }

        // Roots must be absolute and unique
        let mut seen_roots = HashSet::new();
        for (id, ws) in &self.workspaces {
            if ws.root.trim().is_empty() || !Path::new(&ws.root).is_absolute() {
                errors.push(ConfigError::InvalidWorkspaceRoot(
                    id.clone(),
                    "Workspace root must be an absolute path".to_string(),
                ));
                continue;
            }
            if !seen_roots.insert(normalize_root(&ws.root)) {
                errors.push(ConfigError::DuplicateWorkspaceRoot(ws.root.clone()));
            }
        }

        // A workspace may not live inside another one
        let roots: Vec<_> = self
            .workspaces
            .values()
            .map(|ws| normalize_root(&ws.root))
            .collect();
        for (i, root_a) in roots.iter().enumerate() {
            for (j, root_b) in roots.iter().enumerate() {
                if i != j && root_b.starts_with(&format!("{}/", root_a)) {
                    errors.push(ConfigError::NestedWorkspaces(
                        root_a.to_string(),
                        root_b.to_string(),
                    ));
                }
            }
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// A directory name must be exactly one normal path component.
fn check_single_component(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.contains('/') || name.contains('\\') {
        return Err("must not contain path separators".to_string());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err("must be a plain directory name".to_string()),
    }
}

/// Normalize a root by removing trailing slashes.
fn normalize_root(root: &str) -> &str {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
