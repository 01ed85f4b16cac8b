use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use linkview_core::{DirEntry, FileStat, Filesystem, FsError};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::Mutex;

/// Prefix used in error messages to distinguish injected faults from real errors.
pub const FAULT_PREFIX: &str = "[fault-injected]";

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of failing a mutating call (0.0-1.0).
    pub error_rate: f64,
    /// Probability of failing a `stat` or `list_dir` (0.0-1.0).
    pub read_error_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultStats {
    pub fault_count: usize,
}

/// A filesystem wrapper that randomly fails calls.
///
/// Injected failures happen before the inner call, so a failed call never
/// has a side effect.
pub struct FaultyFs {
    inner: Arc<dyn Filesystem>,
    rng: Mutex<ChaCha8Rng>,
    config: FaultConfig,
    enabled: AtomicBool,
    fault_count: AtomicUsize,
}

impl FaultyFs {
    pub fn new(inner: Arc<dyn Filesystem>, rng: ChaCha8Rng, config: FaultConfig) -> Self {
        FaultyFs {
            inner,
            rng: Mutex::new(rng),
            config,
            enabled: AtomicBool::new(true),
            fault_count: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> FaultStats {
        FaultStats {
            fault_count: self.fault_count.load(Ordering::Relaxed),
        }
    }

    /// Stop injecting faults, e.g. before a final recovery pass.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    async fn roll(&self, rate: f64) -> bool {
        if rate <= 0.0 || !self.enabled.load(Ordering::Relaxed) {
            return false;
        }
        let roll: f64 = self.rng.lock().await.gen();
        roll < rate
    }

    async fn inject(&self, op: &str, path: &Path, rate: f64) -> Result<(), FsError> {
        if !self.roll(rate).await {
            return Ok(());
        }
        self.fault_count.fetch_add(1, Ordering::Relaxed);
        let permission: bool = self.rng.lock().await.gen();
        if permission {
            Err(FsError::PermissionDenied(path.to_path_buf()))
        } else {
            Err(FsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other(format!("{} {} failed", FAULT_PREFIX, op)),
            })
        }
    }
}

#[async_trait]
impl Filesystem for FaultyFs {
    async fn mkdir_all(&self, path: &Path) -> Result<(), FsError> {
        self.inject("mkdir_all", path, self.config.error_rate).await?;
        self.inner.mkdir_all(path).await
    }

    async fn hard_link(&self, src: &Path, dst: &Path) -> Result<(), FsError> {
        self.inject("hard_link", dst, self.config.error_rate).await?;
        self.inner.hard_link(src, dst).await
    }

    async fn remove(&self, path: &Path) -> Result<(), FsError> {
        self.inject("remove", path, self.config.error_rate).await?;
        self.inner.remove(path).await
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, FsError> {
        self.inject("stat", path, self.config.read_error_rate).await?;
        self.inner.stat(path).await
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        self.inject("list_dir", path, self.config.read_error_rate).await?;
        self.inner.list_dir(path).await
    }

    async fn write_new(&self, path: &Path, content: &[u8]) -> Result<(), FsError> {
        self.inject("write_new", path, self.config.error_rate).await?;
        self.inner.write_new(path, content).await
    }
}

/// Check if an error was injected by the fault layer.
pub fn is_injected_fault(err: &FsError) -> bool {
    match err {
        FsError::Io { source, .. } => source.to_string().contains(FAULT_PREFIX),
        FsError::PermissionDenied(_) => true,
        _ => false,
    }
}
