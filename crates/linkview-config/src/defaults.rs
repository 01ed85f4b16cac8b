use std::path::Path;

use crate::types::{HumanDuration, LinkviewConfig};

pub const DEFAULT_VIRTUAL_DIR: &str = ".linkview";
pub const DEFAULT_THUMBNAIL_DIR: &str = ".thumbnails";
pub const DEFAULT_MARKER_LANGUAGE: &str = "en";
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

impl LinkviewConfig {
    /// Apply default inference rules to the configuration.
    /// This mutates the config in place.
    pub fn apply_defaults(&mut self) {
        if self.virtual_dir.is_none() {
            self.virtual_dir = Some(DEFAULT_VIRTUAL_DIR.to_string());
        }
        if self.thumbnail_dir.is_none() {
            self.thumbnail_dir = Some(DEFAULT_THUMBNAIL_DIR.to_string());
        }
        if self.marker_language.is_none() {
            self.marker_language = Some(DEFAULT_MARKER_LANGUAGE.to_string());
        }
        if self.reconcile_interval.is_none() {
            self.reconcile_interval = Some(HumanDuration(std::time::Duration::from_secs(
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )));
        }

        // The catalog sits next to the first workspace's virtual root.
        if self.database.is_none() {
            if let Some(ws) = self.workspaces.values().next() {
                let virtual_dir = self.virtual_dir.as_deref().unwrap_or(DEFAULT_VIRTUAL_DIR);
                self.database = Some(derive_database_path(&ws.root, virtual_dir));
            }
        }

        for (id, ws) in &mut self.workspaces {
            if ws.name.is_none() {
                ws.name = Some(id.clone());
            }
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> LinkviewConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }

    pub fn virtual_dir(&self) -> &str {
        self.virtual_dir.as_deref().unwrap_or(DEFAULT_VIRTUAL_DIR)
    }

    pub fn thumbnail_dir(&self) -> &str {
        self.thumbnail_dir.as_deref().unwrap_or(DEFAULT_THUMBNAIL_DIR)
    }

    pub fn marker_language(&self) -> &str {
        self.marker_language.as_deref().unwrap_or(DEFAULT_MARKER_LANGUAGE)
    }

    pub fn reconcile_interval(&self) -> std::time::Duration {
        self.reconcile_interval
            .as_ref()
            .map(HumanDuration::as_duration)
            .unwrap_or(std::time::Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS))
    }
}

/// `/home/me/Documents` + `.linkview` -> `/home/me/Documents/.linkview.db`
fn derive_database_path(root: &str, virtual_dir: &str) -> String {
    Path::new(root)
        .join(format!("{}.db", virtual_dir))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkspaceConfig;

    fn workspace(root: &str) -> WorkspaceConfig {
        WorkspaceConfig {
            root: root.to_string(),
            name: None,
        }
    }

    #[test]
    fn test_derive_database_path() {
        assert_eq!(
            derive_database_path("/data/docs", ".linkview"),
            "/data/docs/.linkview.db"
        );
    }

    #[test]
    fn test_apply_defaults_fills_layout() {
        let mut config = LinkviewConfig {
            workspaces: indexmap::indexmap! {
                "docs".to_string() => workspace("/data/docs"),
            },
            ..Default::default()
        };

        config.apply_defaults();

        assert_eq!(config.virtual_dir.as_deref(), Some(DEFAULT_VIRTUAL_DIR));
        assert_eq!(config.thumbnail_dir.as_deref(), Some(DEFAULT_THUMBNAIL_DIR));
        assert_eq!(config.marker_language.as_deref(), Some("en"));
        assert_eq!(
            config.reconcile_interval(),
            std::time::Duration::from_secs(300)
        );
        assert_eq!(config.database.as_deref(), Some("/data/docs/.linkview.db"));
        assert_eq!(config.workspaces["docs"].name.as_deref(), Some("docs"));
    }

    #[test]
    fn test_apply_defaults_keeps_explicit_values() {
        let mut config = LinkviewConfig {
            database: Some("/var/lib/linkview.db".to_string()),
            virtual_dir: Some(".views".to_string()),
            marker_language: Some("de".to_string()),
            workspaces: indexmap::indexmap! {
                "docs".to_string() => WorkspaceConfig {
                    root: "/data/docs".to_string(),
                    name: Some("Documents".to_string()),
                },
            },
            ..Default::default()
        };

        config.apply_defaults();

        assert_eq!(config.database.as_deref(), Some("/var/lib/linkview.db"));
        assert_eq!(config.virtual_dir(), ".views");
        assert_eq!(config.marker_language(), "de");
        assert_eq!(config.workspaces["docs"].name.as_deref(), Some("Documents"));
    }

    #[test]
    fn test_no_workspaces_no_database() {
        let config = LinkviewConfig::default().effective();
        assert!(config.database.is_none());
    }
}
