use crate::app::App;
use crate::output::print_report;

pub async fn run(app: &App, workspace: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = app.workspace(workspace)?;
    let report = app.service.reconcile_workspace(&workspace).await?;
    print_report("Reconciled", &report, json)
}
