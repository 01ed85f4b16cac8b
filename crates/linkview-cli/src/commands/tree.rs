use std::path::PathBuf;

use linkview_core::Filesystem;

use crate::app::App;

pub async fn run(app: &App, workspace: &str, depth: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = app.workspace(workspace)?;
    let root = app.service.virtual_root(&workspace);
    if app.fs.try_stat(&root).await?.is_none() {
        println!("{} does not exist yet; save a view first.", root.display());
        return Ok(());
    }

    println!("{}", root.display());
    let max_depth = depth.unwrap_or(usize::MAX);

    // (path, label, is_dir, level); popped in display order.
    let mut pending: Vec<(PathBuf, String, bool, usize)> = Vec::new();
    let mut visit = Some((root, 0usize));
    loop {
        if let Some((dir, level)) = visit.take() {
            if level < max_depth {
                let mut entries = app.fs.list_dir(&dir).await?;
                entries.sort_by(|a, b| b.name.cmp(&a.name));
                for entry in entries {
                    pending.push((entry.path, entry.name, entry.is_dir, level + 1));
                }
            }
        }

        let Some((path, name, is_dir, level)) = pending.pop() else {
            break;
        };
        let indent = "  ".repeat(level);
        if is_dir {
            println!("{}{}/", indent, name);
            visit = Some((path, level));
        } else {
            println!("{}{}", indent, name);
        }
    }
    Ok(())
}
