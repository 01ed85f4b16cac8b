use std::error::Error;

use linkview_core::{Conflict, ViewDefinition};
use linkview_engine::SaveOutcome;
use serde::Serialize;

use crate::app::App;
use crate::output::{print_json, print_report};

pub struct SaveArgs {
    pub workspace: String,
    pub name: String,
    pub chain: Vec<String>,
    pub id: Option<String>,
    pub parent: Option<String>,
}

/// Derive a view id from its display name: lowercase ASCII words joined by `-`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn print_view(view: &ViewDefinition) {
    let parent = view
        .parent_id
        .as_deref()
        .map(|p| format!("  (parent {})", p))
        .unwrap_or_default();
    println!("{}/{}  {}  {}{}", view.workspace_id, view.id, view.name, view.chain, parent);
}

fn describe_conflict(conflict: &Conflict) -> String {
    format!(
        "blocked by view '{}' ({}) with the longer chain {}",
        conflict.blocking_view_name, conflict.blocking_view_id, conflict.blocking_chain
    )
}

pub async fn run_list(app: &App, workspace: Option<&str>, json: bool) -> Result<(), Box<dyn Error>> {
    let workspaces = match workspace {
        Some(id) => vec![app.workspace(id)?],
        None => app.workspaces(),
    };

    let mut views = Vec::new();
    for ws in &workspaces {
        views.extend(app.service.list_views(ws).await?);
    }

    if json {
        return print_json(&views);
    }
    if views.is_empty() {
        println!("No views.");
    }
    for view in &views {
        print_view(view);
    }
    Ok(())
}

pub async fn run_save(app: &App, args: SaveArgs, json: bool) -> Result<(), Box<dyn Error>> {
    let workspace = app.workspace(&args.workspace)?;
    let chain = app.chain(&args.chain)?;
    let id = match args.id {
        Some(id) => id,
        None => slug(&args.name),
    };
    if id.is_empty() {
        return Err(format!("cannot derive a view id from '{}'; pass --id", args.name).into());
    }

    let mut view = ViewDefinition::new(id.as_str(), workspace.id.as_str(), args.name.as_str(), chain);
    if let Some(parent) = args.parent {
        view = view.with_parent(parent);
    }

    let outcome = app.service.save_view(&workspace, view).await?;
    if json {
        print_json(&outcome)?;
    }
    match outcome {
        SaveOutcome::Saved {
            virtual_path,
            superseded,
            report,
        } => {
            if !json {
                println!("Saved view '{}' at {}", id, virtual_path.display());
                for old in &superseded {
                    println!("  replaced view '{}' {}", old.id, old.chain);
                }
                print_report("Materialized", &report, false)?;
            }
            Ok(())
        }
        SaveOutcome::Conflict(conflict) => {
            Err(format!("view '{}' was not saved: {}", id, describe_conflict(&conflict)).into())
        }
    }
}

#[derive(Serialize)]
struct CheckOut<'a> {
    chain: String,
    conflict: Option<&'a Conflict>,
}

pub async fn run_check(
    app: &App,
    workspace: &str,
    chain: &[String],
    exclude: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let workspace = app.workspace(workspace)?;
    let chain = app.chain(chain)?;
    chain.validate()?;
    let conflict = app.service.check_conflict(&workspace, &chain, exclude).await?;

    if json {
        print_json(&CheckOut {
            chain: chain.to_string(),
            conflict: conflict.as_ref(),
        })?;
    } else if conflict.is_none() {
        println!("{} can be saved.", chain);
    }
    match conflict {
        Some(conflict) => Err(format!("{} is {}", chain, describe_conflict(&conflict)).into()),
        None => Ok(()),
    }
}

pub async fn run_delete(app: &App, workspace: &str, id: &str, json: bool) -> Result<(), Box<dyn Error>> {
    let workspace = app.workspace(workspace)?;
    let report = app.service.delete_view(&workspace, id).await?;
    if !json {
        println!("Deleted view '{}'", id);
    }
    print_report("Cleaned up", &report, json)
}

pub async fn run_rename(
    app: &App,
    workspace: &str,
    id: &str,
    name: &str,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let workspace = app.workspace(workspace)?;
    let view = app.service.rename_view(&workspace, id, name).await?;
    if json {
        return print_json(&view);
    }
    print_view(&view);
    Ok(())
}
