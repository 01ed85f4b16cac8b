use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

use linkview_store::{Catalog, FileRecord};
use serde::Serialize;
use tracing::{debug, info};

use crate::app::{absolute, parse_tag, App};
use crate::output::{print_json, print_report};

/// Error rename(2) returns across filesystems.
#[cfg(unix)]
const CROSS_DEVICE: i32 = libc::EXDEV;
#[cfg(windows)]
const CROSS_DEVICE: i32 = 17; // ERROR_NOT_SAME_DEVICE

#[derive(Serialize)]
struct FileOut {
    id: String,
    workspace: String,
    path: PathBuf,
    display_name: Option<String>,
    eligible: bool,
    tags: Vec<String>,
}

impl From<FileRecord> for FileOut {
    fn from(record: FileRecord) -> Self {
        FileOut {
            tags: record
                .tags
                .iter()
                .map(|t| format!("{}={}", t.dimension_name, t.tag_value))
                .collect(),
            id: record.id,
            workspace: record.workspace_id,
            path: record.path,
            display_name: record.display_name,
            eligible: record.eligible,
        }
    }
}

pub fn run_add(
    app: &App,
    path: &Path,
    name: Option<&str>,
    tags: &[String],
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let path = absolute(path)?;
    let meta = std::fs::symlink_metadata(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    if !meta.is_file() {
        return Err(format!("{} is not a regular file", path.display()).into());
    }
    let workspace = app.workspace_for_path(&path)?;

    // Parse everything before writing anything.
    let tags = tags
        .iter()
        .map(|t| parse_tag(t))
        .collect::<Result<Vec<_>, _>>()?;

    let id = app.catalog.add_file(&workspace.id, &path, name)?;
    for (dimension, value) in tags {
        let dim = app.catalog.add_dimension(dimension)?;
        app.catalog.tag_file(&id, dim.id, value)?;
    }
    info!(file_id = %id, workspace = %workspace.id, "file registered");

    if json {
        let record = app
            .catalog
            .get_file(&id)?
            .ok_or_else(|| format!("file {} vanished from the catalog", id))?;
        return print_json(&FileOut::from(record));
    }
    println!("{}", id);
    Ok(())
}

pub fn run_list(app: &App, workspace: &str, json: bool) -> Result<(), Box<dyn Error>> {
    let workspace = app.workspace(workspace)?;
    let records = app.catalog.list_files(&workspace.id)?;
    if json {
        let out: Vec<FileOut> = records.into_iter().map(FileOut::from).collect();
        return print_json(&out);
    }
    if records.is_empty() {
        println!("No files in {}.", workspace.id);
    }
    for record in records.into_iter().map(FileOut::from) {
        let flag = if record.eligible { "" } else { "  (not eligible)" };
        println!(
            "{}  {}  [{}]{}",
            record.id,
            record.path.display(),
            record.tags.join(", "),
            flag
        );
    }
    Ok(())
}

pub fn run_tag(app: &App, id: &str, tag: &str) -> Result<(), Box<dyn Error>> {
    let (dimension, value) = parse_tag(tag)?;
    let dim = app.catalog.add_dimension(dimension)?;
    app.catalog.tag_file(id, dim.id, value)?;
    println!("Tagged {} with {}={}", id, dim.name, value);
    Ok(())
}

pub fn run_untag(app: &App, id: &str, dimension: &str) -> Result<(), Box<dyn Error>> {
    let dim = app
        .catalog
        .dimensions()?
        .into_iter()
        .find(|d| d.name == dimension)
        .ok_or_else(|| format!("unknown dimension '{}'", dimension))?;
    let removed = app.catalog.untag_file(id, dim.id)?;
    println!("Removed {} value(s) of {} from {}", removed, dim.name, id);
    Ok(())
}

pub fn run_eligible(app: &App, id: &str, eligible: bool) -> Result<(), Box<dyn Error>> {
    app.catalog.set_eligible(id, eligible)?;
    let state = if eligible { "eligible" } else { "not eligible" };
    println!("{} is now {}", id, state);
    Ok(())
}

/// Move a source file inside its workspace and repoint its links.
pub async fn run_move(app: &App, id: &str, new_path: &Path, json: bool) -> Result<(), Box<dyn Error>> {
    let record = app
        .catalog
        .get_file(id)?
        .ok_or_else(|| format!("unknown file '{}'", id))?;
    let workspace = app.workspace(&record.workspace_id)?;
    let new_path = absolute(new_path)?;
    if !new_path.starts_with(&workspace.root) {
        return Err(format!("{} is outside workspace {}", new_path.display(), workspace.id).into());
    }
    if std::fs::symlink_metadata(&new_path).is_ok() {
        return Err(format!("{} already exists", new_path.display()).into());
    }

    let capture = app
        .service
        .capture_before_move(&workspace, id, &record.path)
        .await?;
    if let Some(parent) = new_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    move_file(&record.path, &new_path)?;
    app.catalog.set_path(id, &new_path)?;

    let report = app
        .service
        .relink_after_move(&workspace, &capture, &new_path)
        .await?;
    if !json {
        println!("Moved {} to {}", id, new_path.display());
    }
    print_report("Relinked", &report, json)
}

/// Rename, or copy and delete when the destination is on another device.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE) => {
            debug!(from = %from.display(), to = %to.display(), "rename crosses devices, copying");
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}
