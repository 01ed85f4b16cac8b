//! Materializes saved tag-chain views as trees of hardlinks under a
//! workspace's virtual root.

mod dedup;
mod exclusivity;
mod links;
mod plan;
mod project;
mod reconcile;
mod relink;
mod report;
mod service;
mod walk;

pub use plan::{FileAssignment, GenerationPlan, PlanNode, PlanOptions, PlanOutcome};
pub use relink::MoveCapture;
pub use report::PassReport;
pub use service::{SaveOutcome, ViewService};
