use std::fmt;

use serde::Serialize;

/// Counters collected during one pass over a virtual root.
///
/// Per-file failures end up here instead of in an error; a pass with
/// `failed > 0` still completed and the next pass retries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Links created where nothing existed.
    pub linked: usize,
    /// Entries replaced because they pointed at the wrong file.
    pub repaired: usize,
    /// Links that were already correct.
    pub already_present: usize,
    /// Stale or orphaned entries removed.
    pub removed: usize,
    /// Shallower duplicates removed because a deeper link exists.
    pub deduplicated: usize,
    /// Links removed from other views after a save captured their file.
    pub exclusivity_removed: usize,
    pub dirs_pruned: usize,
    /// Source files that could not be read and were left out.
    pub skipped_missing: usize,
    pub failed: usize,
}

impl PassReport {
    /// Number of filesystem mutations the pass performed.
    pub fn changes(&self) -> usize {
        self.linked
            + self.repaired
            + self.removed
            + self.deduplicated
            + self.exclusivity_removed
            + self.dirs_pruned
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "linked={} repaired={} present={} removed={} deduplicated={} exclusive={} pruned={} missing={} failed={}",
            self.linked,
            self.repaired,
            self.already_present,
            self.removed,
            self.deduplicated,
            self.exclusivity_removed,
            self.dirs_pruned,
            self.skipped_missing,
            self.failed
        )
    }
}
