//! Filesystem implementations for the linkview engine.
//!
//! [`LocalFs`] talks to the operating system; [`MemoryFs`] keeps a tree of
//! simulated inodes in memory so hardlink behavior can be tested without
//! touching disk.

mod local;
mod memory;

pub use local::LocalFs;
pub use memory::MemoryFs;
