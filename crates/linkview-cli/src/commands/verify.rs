use linkview_sim::invariants::check_final_consistency;
use serde::Serialize;

use crate::app::App;
use crate::output::print_json;

#[derive(Serialize)]
struct ViolationOut {
    invariant: String,
    details: String,
}

pub async fn run(app: &App, workspace: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = app.workspace(workspace)?;
    let views = app.service.list_views(&workspace).await?;
    let plan_dirs = app.service.plan_dirs(&workspace).await?;
    let violations = check_final_consistency(
        0,
        app.fs.as_ref(),
        app.catalog.as_ref(),
        app.service.layout(),
        &workspace,
        &views,
        &plan_dirs,
    )
    .await;

    if json {
        let out: Vec<ViolationOut> = violations
            .iter()
            .map(|v| ViolationOut {
                invariant: v.invariant.clone(),
                details: v.details.clone(),
            })
            .collect();
        print_json(&out)?;
    } else if violations.is_empty() {
        println!("{}: {} view(s), no problems found.", workspace.id, views.len());
    } else {
        for v in &violations {
            println!("{}: {}", v.invariant, v.details);
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "{} problem(s) found; `linkview sync {}` rebuilds the views",
            violations.len(),
            workspace.id
        )
        .into())
    }
}
