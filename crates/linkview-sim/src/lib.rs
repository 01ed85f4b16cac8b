pub mod fault;
pub mod invariants;
pub mod ops;
pub mod sim;

pub use fault::{FaultConfig, FaultyFs};
pub use sim::Sim;
