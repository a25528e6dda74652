//! Shared test utilities: an in-memory fake of the version-control backend.
//!
//! The fake models just enough of a repository for orchestrator tests:
//! branches with a latest-commit fingerprint each, a containment relation so
//! repeated merges report "already up to date", and scripted failure points
//! (conflicts, failing aborts, failing deletions). Every call is recorded in
//! `calls` so tests can assert which operations were (or were not) issued.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::git::{GitError, GitResult, MergeOutcome, VersionControlBackend};
use crate::types::{CommitInfo, Sha};

/// In-memory [`VersionControlBackend`] with a recorded call log.
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub local_branches: BTreeSet<String>,
    pub remote_branches: BTreeSet<String>,
    heads: HashMap<String, CommitInfo>,
    /// Hashes each branch has already absorbed via merge.
    contains: HashMap<String, HashSet<Sha>>,
    /// (target, source) pairs whose merge reports a conflict.
    pub conflicts: HashSet<(String, String)>,
    /// When set, `abort_merge` fails, forcing the hard-reset fallback.
    pub fail_abort: bool,
    pub fail_delete_local: HashSet<String>,
    pub fail_delete_remote: HashSet<String>,
    pub current: Option<String>,
    /// Every backend call, in order, e.g. `"merge uat <- 2025-09-01"`.
    pub calls: Vec<String>,
    counter: u64,
}

impl FakeBackend {
    pub fn new() -> Self {
        FakeBackend::default()
    }

    /// Adds a branch known both locally and on the remote, with a fresh head.
    pub fn add_branch(&mut self, name: &str) -> CommitInfo {
        self.local_branches.insert(name.to_string());
        self.remote_branches.insert(name.to_string());
        let commit = self.new_commit(format!("seed {name}"));
        self.heads.insert(name.to_string(), commit.clone());
        commit
    }

    /// Removes all trace of a branch (local, remote, head).
    pub fn remove_branch(&mut self, name: &str) {
        self.local_branches.remove(name);
        self.remote_branches.remove(name);
        self.heads.remove(name);
    }

    /// Simulates new work landing on a branch.
    pub fn advance(&mut self, branch: &str, message: &str) -> CommitInfo {
        let commit = self.new_commit(message.to_string());
        self.heads.insert(branch.to_string(), commit.clone());
        commit
    }

    pub fn head(&self, branch: &str) -> Option<&CommitInfo> {
        self.heads.get(branch)
    }

    /// Scripts the next merge of `source` into `target` to conflict.
    pub fn script_conflict(&mut self, target: &str, source: &str) {
        self.conflicts
            .insert((target.to_string(), source.to_string()));
    }

    /// Calls whose log entry starts with the given prefix.
    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.calls
            .iter()
            .map(String::as_str)
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    fn new_commit(&mut self, message: String) -> CommitInfo {
        self.counter += 1;
        CommitInfo {
            hash: Sha::new(format!("{:040x}", self.counter)),
            date: "2025-09-01T00:00:00+00:00".to_string(),
            message,
            author: "Test".to_string(),
        }
    }

    fn require_head(&self, branch: &str) -> GitResult<CommitInfo> {
        self.heads
            .get(branch)
            .cloned()
            .ok_or_else(|| GitError::RefNotFound(branch.to_string()))
    }
}

impl VersionControlBackend for FakeBackend {
    fn branch_exists(&mut self, branch: &str) -> GitResult<bool> {
        self.calls.push(format!("branch_exists {branch}"));
        Ok(self.local_branches.contains(branch))
    }

    fn remote_branch_exists(&mut self, branch: &str) -> GitResult<bool> {
        self.calls.push(format!("remote_branch_exists {branch}"));
        Ok(self.remote_branches.contains(branch))
    }

    fn fetch(&mut self) -> GitResult<()> {
        self.calls.push("fetch".to_string());
        Ok(())
    }

    fn pull(&mut self, branch: &str) -> GitResult<()> {
        self.calls.push(format!("pull {branch}"));
        self.require_head(branch)?;
        self.current = Some(branch.to_string());
        Ok(())
    }

    fn checkout(&mut self, branch: &str) -> GitResult<()> {
        self.calls.push(format!("checkout {branch}"));
        if !self.local_branches.contains(branch) && !self.remote_branches.contains(branch) {
            return Err(GitError::CommandFailed {
                command: format!("git checkout {branch}"),
                stderr: format!("pathspec '{branch}' did not match any file(s)"),
            });
        }
        self.local_branches.insert(branch.to_string());
        self.current = Some(branch.to_string());
        Ok(())
    }

    fn create_branch(&mut self, from: &str, to: &str) -> GitResult<()> {
        self.calls.push(format!("create_branch {to} from {from}"));
        let head = self.require_head(from)?;
        self.local_branches.insert(to.to_string());
        self.heads.insert(to.to_string(), head);
        self.current = Some(to.to_string());
        Ok(())
    }

    fn empty_commit(&mut self, message: &str) -> GitResult<()> {
        self.calls.push(format!("empty_commit {message}"));
        let Some(branch) = self.current.clone() else {
            return Err(GitError::CommandFailed {
                command: "git commit --allow-empty".to_string(),
                stderr: "no branch checked out".to_string(),
            });
        };
        let commit = self.new_commit(message.to_string());
        self.heads.insert(branch, commit);
        Ok(())
    }

    fn merge(&mut self, target: &str, source: &str, no_ff: bool) -> GitResult<MergeOutcome> {
        let suffix = if no_ff { " (no-ff)" } else { "" };
        self.calls.push(format!("merge {target} <- {source}{suffix}"));
        self.current = Some(target.to_string());

        if self.conflicts.remove(&(target.to_string(), source.to_string())) {
            return Ok(MergeOutcome::Conflict {
                conflicting_files: vec!["conflict.txt".to_string()],
            });
        }

        let source_head = self.require_head(source)?;
        let target_head = self.require_head(target)?;

        let absorbed = self
            .contains
            .get(target)
            .is_some_and(|hashes| hashes.contains(&source_head.hash));
        if absorbed || target_head.hash == source_head.hash {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        let merged = if no_ff {
            let commit = self.new_commit(format!("Merge {source} into {target}"));
            self.heads.insert(target.to_string(), commit.clone());
            commit
        } else {
            // Fast-forward: the target takes over the source head.
            self.heads.insert(target.to_string(), source_head.clone());
            source_head.clone()
        };
        self.contains
            .entry(target.to_string())
            .or_default()
            .insert(source_head.hash);

        Ok(MergeOutcome::Merged {
            commit: merged.hash,
        })
    }

    fn rebase(&mut self, branch: &str, onto: &str) -> GitResult<()> {
        self.calls.push(format!("rebase {branch} onto {onto}"));
        Ok(())
    }

    fn push(&mut self, branch: &str, force: bool) -> GitResult<()> {
        let suffix = if force { " (force)" } else { "" };
        self.calls.push(format!("push {branch}{suffix}"));
        self.remote_branches.insert(branch.to_string());
        Ok(())
    }

    fn delete_branch(&mut self, branch: &str) -> GitResult<()> {
        self.calls.push(format!("delete_branch {branch}"));
        if self.fail_delete_local.contains(branch) {
            return Err(GitError::CommandFailed {
                command: format!("git branch -D {branch}"),
                stderr: "cannot delete branch".to_string(),
            });
        }
        self.local_branches.remove(branch);
        Ok(())
    }

    fn delete_remote_branch(&mut self, branch: &str) -> GitResult<()> {
        self.calls.push(format!("delete_remote_branch {branch}"));
        if self.fail_delete_remote.contains(branch) {
            return Err(GitError::CommandFailed {
                command: format!("git push --delete {branch}"),
                stderr: "remote rejected".to_string(),
            });
        }
        self.remote_branches.remove(branch);
        Ok(())
    }

    fn latest_commit(&mut self, branch: &str) -> GitResult<CommitInfo> {
        self.calls.push(format!("latest_commit {branch}"));
        self.require_head(branch)
    }

    fn abort_merge(&mut self) -> GitResult<()> {
        self.calls.push("abort_merge".to_string());
        if self.fail_abort {
            return Err(GitError::CommandFailed {
                command: "git merge --abort".to_string(),
                stderr: "MERGE_HEAD missing".to_string(),
            });
        }
        Ok(())
    }

    fn hard_reset(&mut self, target: &str) -> GitResult<()> {
        self.calls.push(format!("hard_reset {target}"));
        Ok(())
    }
}
