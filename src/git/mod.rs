//! Version-control backend capability.
//!
//! The orchestrator only ever issues a fixed vocabulary of branch-level
//! operations, declared here as the [`VersionControlBackend`] trait. The
//! concrete subprocess implementation lives in [`session`]; tests drive the
//! orchestrator with a fake. All methods take `&mut self`: the exclusive
//! borrow is what serializes every operation against the single working
//! tree; no two logical environments can be processed concurrently.

pub mod recovery;
pub mod session;

pub use session::{DryRunBackend, GitSession};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CommitInfo, Sha};

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Push was rejected by the remote (non-fast-forward).
    #[error("push of {branch} rejected: {details}")]
    PushRejected { branch: String, details: String },

    /// A ref the operation needs does not exist.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// Backend output could not be interpreted.
    #[error("unexpected git output: {0}")]
    UnexpectedOutput(String),

    /// IO error spawning or talking to the subprocess.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Result of a merge operation.
///
/// A conflict is a normal outcome here, not an error: the orchestrator
/// decides per flow whether it is fatal, and drives recovery either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge completed, producing (or fast-forwarding to) this commit.
    Merged { commit: Sha },

    /// Merge was a no-op; the target already contained the source.
    AlreadyUpToDate,

    /// Merge stopped on conflicts; the working tree needs recovery.
    Conflict { conflicting_files: Vec<String> },
}

impl MergeOutcome {
    /// True when the merge completed without conflict (including no-op).
    pub fn is_clean(&self) -> bool {
        !self.is_conflict()
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MergeOutcome::Conflict { .. })
    }
}

/// Identity used for merge and marker commits.
///
/// Passed via `-c` flags to git commands, so commits can be created even when
/// the repository has no `user.name`/`user.email` configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

/// The fixed vocabulary of branch-level operations the orchestrator issues.
///
/// Variants in behavior (forced vs. plain push, `--no-ff` vs. default merge)
/// are call parameters, not separate capabilities, which keeps the
/// orchestrator decoupled from any particular backend and testable with a
/// fake.
pub trait VersionControlBackend {
    /// Whether a local branch exists.
    fn branch_exists(&mut self, branch: &str) -> GitResult<bool>;

    /// Whether the branch exists on the configured remote.
    fn remote_branch_exists(&mut self, branch: &str) -> GitResult<bool>;

    /// Fetch refs from the configured remote.
    fn fetch(&mut self) -> GitResult<()>;

    /// Checkout `branch` and pull it from the remote.
    fn pull(&mut self, branch: &str) -> GitResult<()>;

    /// Checkout a branch (local, or a remote branch to track).
    fn checkout(&mut self, branch: &str) -> GitResult<()>;

    /// Create branch `to` from `from` and leave it checked out.
    fn create_branch(&mut self, from: &str, to: &str) -> GitResult<()>;

    /// Create an empty commit on the currently checked-out branch.
    fn empty_commit(&mut self, message: &str) -> GitResult<()>;

    /// Merge `source` into `target` (checking out `target` first).
    /// `no_ff` forces a merge commit even when fast-forward is possible.
    fn merge(&mut self, target: &str, source: &str, no_ff: bool) -> GitResult<MergeOutcome>;

    /// Rebase `branch` onto `onto`.
    fn rebase(&mut self, branch: &str, onto: &str) -> GitResult<()>;

    /// Push a branch to the remote. `force` uses `--force-with-lease`.
    fn push(&mut self, branch: &str, force: bool) -> GitResult<()>;

    /// Delete a local branch.
    fn delete_branch(&mut self, branch: &str) -> GitResult<()>;

    /// Delete a branch on the remote.
    fn delete_remote_branch(&mut self, branch: &str) -> GitResult<()>;

    /// Hash, date, subject and author of the latest commit on a ref.
    fn latest_commit(&mut self, branch: &str) -> GitResult<CommitInfo>;

    /// Abort an in-progress merge.
    fn abort_merge(&mut self) -> GitResult<()>;

    /// Hard-reset the working tree to a target ref.
    fn hard_reset(&mut self, target: &str) -> GitResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_outcome_predicates() {
        let merged = MergeOutcome::Merged {
            commit: Sha::new("a".repeat(40)),
        };
        assert!(merged.is_clean());
        assert!(!merged.is_conflict());

        assert!(MergeOutcome::AlreadyUpToDate.is_clean());

        let conflict = MergeOutcome::Conflict {
            conflicting_files: vec!["src/lib.rs".to_string()],
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_clean());
    }
}
