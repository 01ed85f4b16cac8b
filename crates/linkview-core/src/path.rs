//! Deterministic mapping from tag chains and source files to link paths.

use std::path::{Component, Path, PathBuf};

use crate::chain::TagSelector;

/// Directory of a chain prefix, relative to the virtual root.
///
/// `[Genre=Doc, Format=PDF]` -> `Doc/PDF`
pub fn relative_dir(prefix: &[TagSelector]) -> PathBuf {
    prefix.iter().map(|s| s.tag_value.as_str()).collect()
}

/// Absolute directory of a chain prefix under `virtual_root`.
pub fn level_dir(virtual_root: &Path, prefix: &[TagSelector]) -> PathBuf {
    virtual_root.join(relative_dir(prefix))
}

/// Name a source file gets inside a virtual directory.
///
/// The display name wins over the original name, but the original extension
/// is always kept: it is appended to the display name when the display name
/// ends in a different one.
pub fn link_file_name(original: &Path, display_name: Option<&str>) -> String {
    let original_name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let alias = match display_name.map(sanitize_name) {
        Some(alias) if !alias.is_empty() => alias,
        _ => return original_name,
    };

    let original_ext = match original.extension() {
        Some(ext) => ext.to_string_lossy().into_owned(),
        None => return alias,
    };

    let alias_ext = Path::new(&alias)
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    match alias_ext {
        Some(ext) if ext.eq_ignore_ascii_case(&original_ext) => alias,
        _ => format!("{}.{}", alias, original_ext),
    }
}

/// Disambiguate a link name for the `n`-th file (n >= 2) sharing it.
///
/// `report.pdf`, 2 -> `report (2).pdf`
pub fn with_collision_suffix(name: &str, n: usize) -> String {
    if n <= 1 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{} ({}){}", &name[..idx], n, &name[idx..]),
        _ => format!("{} ({})", name, n),
    }
}

/// Replace characters that cannot appear in a single path component.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "." | ".." => String::new(),
        _ => cleaned,
    }
}

/// A tag value or folder name must map to exactly one normal directory name.
pub fn check_path_component(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("name is empty".to_string());
    }
    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        return Err("name contains a path separator".to_string());
    }
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err("name is not a plain directory name".to_string()),
    }
}
