use std::str::FromStr;
use std::time::Duration;

use linkview_config::HumanDuration;
use tracing::{error, info};

use crate::app::App;
use crate::output::print_report;

pub async fn run(
    app: &App,
    workspace: &str,
    interval: Option<&str>,
    passes: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = app.workspace(workspace)?;
    let interval: Duration = match interval {
        Some(s) => HumanDuration::from_str(s)?.as_duration(),
        None => app.config.reconcile_interval(),
    };
    if interval.is_zero() {
        return Err("interval must be greater than zero".into());
    }
    info!(workspace = %workspace.id, interval = %HumanDuration(interval), "watching");

    let mut done = 0;
    loop {
        // One pass at a time; a failed pass is logged and retried next tick.
        match app.service.reconcile_workspace(&workspace).await {
            Ok(report) => {
                if json || report.changes() > 0 || report.failed > 0 {
                    print_report("Reconciled", &report, json)?;
                }
            }
            Err(e) => error!(workspace = %workspace.id, error = %e, "reconcile pass failed"),
        }

        done += 1;
        if passes.is_some_and(|max| done >= max) {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        }
    }
}
