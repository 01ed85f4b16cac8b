use std::path::PathBuf;

use linkview_config::{
    LinkviewConfig, DEFAULT_MARKER_LANGUAGE, DEFAULT_THUMBNAIL_DIR, DEFAULT_VIRTUAL_DIR,
};

use crate::types::Workspace;

/// Every marker file name starts with this, whatever its language.
pub const MARKER_PREFIX: &str = "_ABOUT_LINKVIEW";

/// Where the materialized tree lives inside a workspace, and which names in
/// it are protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualLayout {
    pub virtual_dir: String,
    pub thumbnail_dir: String,
    pub marker_language: String,
}

impl Default for VirtualLayout {
    fn default() -> Self {
        VirtualLayout {
            virtual_dir: DEFAULT_VIRTUAL_DIR.to_string(),
            thumbnail_dir: DEFAULT_THUMBNAIL_DIR.to_string(),
            marker_language: DEFAULT_MARKER_LANGUAGE.to_string(),
        }
    }
}

impl From<&LinkviewConfig> for VirtualLayout {
    fn from(config: &LinkviewConfig) -> Self {
        VirtualLayout {
            virtual_dir: config.virtual_dir().to_string(),
            thumbnail_dir: config.thumbnail_dir().to_string(),
            marker_language: config.marker_language().to_string(),
        }
    }
}

impl VirtualLayout {
    pub fn virtual_root(&self, workspace: &Workspace) -> PathBuf {
        workspace.root.join(&self.virtual_dir)
    }

    pub fn marker_file_name(&self) -> String {
        format!("{}.{}.txt", MARKER_PREFIX, self.marker_language)
    }

    pub fn marker_path(&self, workspace: &Workspace) -> PathBuf {
        self.virtual_root(workspace).join(self.marker_file_name())
    }

    /// Marker files in any language are protected.
    pub fn is_marker(&self, name: &str) -> bool {
        name.starts_with(MARKER_PREFIX)
    }

    pub fn is_reserved_dir(&self, name: &str) -> bool {
        name == self.thumbnail_dir
    }

    pub fn marker_text(&self) -> &'static str {
        match self.marker_language.as_str() {
            "de" => MARKER_DE,
            "fr" => MARKER_FR,
            "es" => MARKER_ES,
            "zh" => MARKER_ZH,
            "ja" => MARKER_JA,
            _ => MARKER_EN,
        }
    }
}

const MARKER_EN: &str = "\
This folder is maintained by linkview.

Every file below it is a hardlink to one of your real files, arranged by the
tags you assigned. Nothing here takes extra disk space, and deleting an entry
here does not delete the original. Entries are recreated or removed
automatically whenever your tags or virtual folders change.
";

const MARKER_DE: &str = "\
Dieser Ordner wird von linkview verwaltet.

Jede Datei darunter ist ein Hardlink auf eine Ihrer echten Dateien, sortiert
nach den vergebenen Tags. Die Einträge belegen keinen zusätzlichen Speicher,
und das Löschen eines Eintrags löscht nicht das Original.
";

const MARKER_FR: &str = "\
Ce dossier est géré par linkview.

Chaque fichier qu'il contient est un lien physique vers l'un de vos fichiers,
classé selon vos étiquettes. Ces entrées n'occupent aucun espace
supplémentaire et les supprimer ne supprime pas l'original.
";

const MARKER_ES: &str = "\
Esta carpeta la gestiona linkview.

Cada archivo que contiene es un enlace físico a uno de sus archivos reales,
ordenado según sus etiquetas. No ocupa espacio adicional y borrar una entrada
no borra el original.
";

const MARKER_ZH: &str = "\
此文件夹由 linkview 维护。

其中的每个文件都是指向您真实文件的硬链接，按您分配的标签排列。
这些条目不占用额外的磁盘空间，删除条目不会删除原始文件。
";

const MARKER_JA: &str = "\
このフォルダは linkview によって管理されています。

中の各ファイルは実ファイルへのハードリンクで、付けたタグごとに並んでいます。
追加のディスク容量は使わず、ここで削除しても元のファイルは消えません。
";
