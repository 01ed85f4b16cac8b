use std::path::{Path, PathBuf};

use linkview_core::{FileIdentity, Filesystem};
use serde::Serialize;
use tracing::{debug, error};

use crate::links::place_link;
use crate::report::PassReport;

/// A file's identity and links, recorded before it is physically moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveCapture {
    pub file_id: String,
    pub old_path: PathBuf,
    pub old_identity: FileIdentity,
    /// Every entry under the virtual root that shared the old identity.
    pub link_paths: Vec<PathBuf>,
}

/// Point every captured link at the file's new location.
///
/// Links that already share the new identity (a same-device rename) are
/// left alone; the rest are replaced.
pub(crate) async fn relink(
    fs: &dyn Filesystem,
    capture: &MoveCapture,
    new_path: &Path,
    new_identity: FileIdentity,
    report: &mut PassReport,
) {
    for link in &capture.link_paths {
        if let Some(parent) = link.parent() {
            if let Err(e) = fs.mkdir_all(parent).await {
                error!(dir = %parent.display(), error = %e, "failed to recreate link directory");
                report.failed += 1;
                continue;
            }
        }
        debug!(link = %link.display(), new = %new_identity, "relinking");
        place_link(fs, new_path, new_identity, link, report).await;
    }
}
