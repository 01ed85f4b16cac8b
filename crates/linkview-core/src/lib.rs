pub mod chain;
mod error;
mod layout;
pub mod path;
mod traits;
mod types;

pub use chain::{check_conflict, relation, ChainRelation, ConflictCheck, TagChain, TagSelector};
pub use error::{ChainError, EngineError, FsError, StoreError};
pub use layout::{VirtualLayout, MARKER_PREFIX};
pub use traits::{Filesystem, TagQuery, ViewStore};
pub use types::{
    Conflict, DirEntry, FileIdentity, FileStat, QualifyingFile, ViewDefinition, Workspace,
};
