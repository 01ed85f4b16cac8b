use std::path::Path;

use linkview_engine::GenerationPlan;

use crate::app::App;
use crate::output::{print_json, print_report};

pub async fn run(
    app: &App,
    workspace: &str,
    plan_path: &Path,
    flatten: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = app.workspace(workspace)?;
    let content = std::fs::read_to_string(plan_path)
        .map_err(|e| format!("cannot read plan {}: {}", plan_path.display(), e))?;
    let mut plan = GenerationPlan::from_json(&content)?;
    if flatten {
        plan.options.flatten = true;
    }

    let outcome = app
        .service
        .generate_from_plan(&workspace, &plan.tree, &plan.assignments, plan.options)
        .await?;
    if json {
        return print_json(&outcome);
    }
    println!(
        "Linked {} of {} assigned file(s)",
        outcome.linked_count,
        plan.assignments.len()
    );
    print_report("Plan", &outcome.report, false)
}
