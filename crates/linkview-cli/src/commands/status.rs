use std::path::PathBuf;

use linkview_core::Filesystem;
use linkview_store::Catalog;
use serde::Serialize;

use crate::app::App;
use crate::output::print_json;

#[derive(Serialize)]
struct WorkspaceStatus {
    id: String,
    root: PathBuf,
    virtual_root: PathBuf,
    materialized: bool,
    views: usize,
    files: usize,
    eligible_files: usize,
}

#[derive(Serialize)]
struct Status {
    database: Option<String>,
    virtual_dir: String,
    reconcile_interval: String,
    dimensions: Vec<String>,
    workspaces: Vec<WorkspaceStatus>,
}

pub async fn run(app: &App, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut workspaces = Vec::new();
    for ws in app.workspaces() {
        let virtual_root = app.service.virtual_root(&ws);
        let files = app.catalog.list_files(&ws.id)?;
        workspaces.push(WorkspaceStatus {
            materialized: app.fs.try_stat(&virtual_root).await?.is_some(),
            views: app.service.list_views(&ws).await?.len(),
            eligible_files: files.iter().filter(|f| f.eligible).count(),
            files: files.len(),
            id: ws.id,
            root: ws.root,
            virtual_root,
        });
    }

    let status = Status {
        database: app.config.database.clone(),
        virtual_dir: app.config.virtual_dir().to_string(),
        reconcile_interval: linkview_config::HumanDuration(app.config.reconcile_interval()).to_string(),
        dimensions: app.catalog.dimensions()?.into_iter().map(|d| d.name).collect(),
        workspaces,
    };
    if json {
        return print_json(&status);
    }

    println!("linkview status");
    println!("===============");
    println!();
    println!("Database: {}", status.database.as_deref().unwrap_or("(none)"));
    println!("Virtual folder: {}", status.virtual_dir);
    println!("Reconcile interval: {}", status.reconcile_interval);
    if status.dimensions.is_empty() {
        println!("Dimensions: (none)");
    } else {
        println!("Dimensions: {}", status.dimensions.join(", "));
    }
    println!();

    println!("Workspaces:");
    for ws in &status.workspaces {
        let state = if ws.materialized { "" } else { " [not materialized]" };
        println!(
            "  {} -> {} ({} views, {}/{} files eligible){}",
            ws.id,
            ws.root.display(),
            ws.views,
            ws.eligible_files,
            ws.files,
            state
        );
    }
    Ok(())
}
