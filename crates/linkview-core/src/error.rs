use std::io::ErrorKind;
use std::path::PathBuf;

/// Errors raised by filesystem primitives.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FsError {
    /// Path does not exist.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Destination already exists.
    #[error("Path already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Permission denied for the given path.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A hardlink was attempted across devices.
    #[error("Cannot link across devices: {src} -> {dst}")]
    CrossDevice { src: PathBuf, dst: PathBuf },

    /// A mutation was attempted outside the roots the filesystem is confined to.
    #[error("Path escapes the allowed roots: {0}")]
    OutsideRoot(PathBuf),

    /// Any other IO error.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Other filesystem-specific error.
    #[error("Filesystem error: {0}")]
    Other(String),
}

impl FsError {
    /// Classify an IO error raised while operating on `path`.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            ErrorKind::NotFound => FsError::NotFound(path),
            ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
            ErrorKind::PermissionDenied => FsError::PermissionDenied(path),
            _ => FsError::Io { path, source: err },
        }
    }

    /// Classify an IO error raised by `hard_link(src, dst)`.
    ///
    /// `source_missing` says whether `src` was gone when the link failed;
    /// the caller looks, so a `NotFound` can name the right side.
    pub fn from_link_io(
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        err: std::io::Error,
        source_missing: bool,
    ) -> Self {
        let src = src.into();
        let dst = dst.into();
        #[cfg(unix)]
        if err.raw_os_error() == Some(libc::EXDEV) {
            return FsError::CrossDevice { src, dst };
        }
        match err.kind() {
            ErrorKind::NotFound if source_missing => FsError::NotFound(src),
            _ => FsError::from_io(dst, err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, FsError::AlreadyExists(_))
    }
}

/// Errors raised by the tag query and view store collaborators.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Reasons a tag chain cannot be materialized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Tag chain is empty")]
    Empty,

    #[error("Dimension '{0}' appears more than once in the chain")]
    DuplicateDimension(String),

    #[error("Tag value '{0}' cannot be used as a folder name: {1}")]
    InvalidTagValue(String, String),
}

/// Operation-level errors returned by the view service.
///
/// Per-file filesystem failures never show up here; they are logged and
/// counted in the pass report.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("View not found: {0}")]
    ViewNotFound(String),

    #[error("File not found in catalog: {0}")]
    FileNotFound(String),

    #[error("View '{view_id}' belongs to workspace '{actual}', not '{expected}'")]
    WorkspaceMismatch {
        view_id: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid tag chain: {0}")]
    InvalidChain(#[from] ChainError),

    #[error("Invalid view name: {0:?}")]
    InvalidName(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// The virtual root itself could not be prepared.
    #[error("Failed to prepare virtual root {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A filesystem call the operation cannot do without failed.
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<linkview_config::ConfigError> for EngineError {
    fn from(e: linkview_config::ConfigError) -> Self {
        EngineError::Config(e.to_string())
    }
}
