pub mod dimension;
pub mod file;
pub mod plan;
pub mod reconcile;
pub mod status;
pub mod sync;
pub mod tree;
pub mod validate;
pub mod verify;
pub mod view;
pub mod watch;
