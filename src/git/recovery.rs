//! Working-tree recovery after a failed merge.
//!
//! A conflicted merge must never leave the tree mid-conflict: the next step
//! in the flow checks out a different branch, and a dirty index would make
//! that checkout fail. The recovery ladder is: abort the in-progress merge;
//! if the abort itself fails, hard-reset the tree to the merge target's last
//! commit.

use tracing::warn;

use super::{GitResult, VersionControlBackend};

/// How a conflicted working tree was cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// `merge --abort` restored the tree.
    MergeAborted,
    /// The abort failed; the tree was hard-reset to the target branch.
    HardReset,
}

/// Restores the working tree after a merge conflict on `target`.
///
/// Returns an error only when both the abort and the hard reset fail, which
/// leaves the tree in a state the orchestrator cannot reason about.
pub fn recover_from_conflict<B: VersionControlBackend + ?Sized>(
    backend: &mut B,
    target: &str,
) -> GitResult<RecoveryOutcome> {
    match backend.abort_merge() {
        Ok(()) => Ok(RecoveryOutcome::MergeAborted),
        Err(abort_err) => {
            warn!(target, error = %abort_err, "merge abort failed, hard-resetting");
            backend.hard_reset(target)?;
            Ok(RecoveryOutcome::HardReset)
        }
    }
}
