//! Human and JSON rendering shared by the commands.

use std::error::Error;

use linkview_engine::PassReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a pass report as one summary line, or as JSON.
pub fn print_report(label: &str, report: &PassReport, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        return print_json(report);
    }
    println!("{}: {}", label, report);
    if report.failed > 0 {
        println!("  {} entries failed; run again to retry", report.failed);
    }
    Ok(())
}
