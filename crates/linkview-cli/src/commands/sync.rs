use crate::app::App;
use crate::output::print_report;

pub async fn run(app: &App, workspace: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = app.workspace(workspace)?;
    let views = app.service.list_views(&workspace).await?;
    let report = app.service.materialize_all(&workspace).await?;
    if !json {
        println!("Rebuilt {} view(s) in {}", views.len(), app.service.virtual_root(&workspace).display());
    }
    print_report("Synced", &report, json)
}
