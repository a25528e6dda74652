//! Subprocess-backed git session.
//!
//! [`GitSession`] is the concrete [`VersionControlBackend`]: every operation
//! shells out to `git` in a fixed working directory and blocks until the
//! process exits. The session owns the only piece of mutable backend state,
//! the cache of the currently checked-out branch; it is invalidated before
//! every checkout and re-established only after the checkout succeeds, so it
//! can never be read stale.
//!
//! [`DryRunBackend`] wraps any backend with the dry-run execution policy:
//! queries are forwarded so preconditions are still evaluated for real, while
//! mutating calls are logged and replaced with no-op successes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info};

use super::{CommitIdentity, GitError, GitResult, MergeOutcome, VersionControlBackend};
use crate::types::{CommitInfo, Sha};

/// Field separator used in `git log --format` output.
const LOG_SEP: char = '\u{1f}';

/// A git working tree plus the remote all pushes go to.
#[derive(Debug)]
pub struct GitSession {
    workdir: PathBuf,
    remote: String,
    identity: Option<CommitIdentity>,
    /// Currently checked-out branch, if known. None after a failed checkout.
    current_branch: Option<String>,
}

impl GitSession {
    pub fn new(
        workdir: impl Into<PathBuf>,
        remote: impl Into<String>,
        identity: Option<CommitIdentity>,
    ) -> Self {
        GitSession {
            workdir: workdir.into(),
            remote: remote.into(),
            identity,
            current_branch: None,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Base git command: correct working directory, never interactive.
    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.workdir);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    /// Git command for operations that create commits. The configured
    /// identity is passed via `-c` flags; without one, the repository's own
    /// configuration applies.
    fn commit_command(&self) -> Command {
        let mut cmd = self.command();
        if let Some(identity) = &self.identity {
            cmd.arg("-c").arg(format!("user.name={}", identity.name));
            cmd.arg("-c").arg(format!("user.email={}", identity.email));
        }
        cmd
    }

    fn run_cmd(mut cmd: Command, args: &[&str]) -> GitResult<Output> {
        let output = cmd.args(args).output()?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn run(&self, args: &[&str]) -> GitResult<Output> {
        Self::run_cmd(self.command(), args)
    }

    fn run_stdout(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn rev_parse(&self, rev: &str) -> GitResult<Sha> {
        let sha = self.run_stdout(&["rev-parse", rev])?;
        Sha::parse(&sha).map_err(GitError::UnexpectedOutput)
    }

    /// Files currently in conflict (unmerged paths).
    fn conflicting_files(&self) -> GitResult<Vec<String>> {
        let output = self.run_stdout(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(output.lines().map(str::to_string).collect())
    }
}

impl VersionControlBackend for GitSession {
    fn branch_exists(&mut self, branch: &str) -> GitResult<bool> {
        let status = self
            .command()
            .args([
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])
            .output()?
            .status;
        Ok(status.success())
    }

    fn remote_branch_exists(&mut self, branch: &str) -> GitResult<bool> {
        let refspec = format!("refs/heads/{branch}");
        let output = self.run_stdout(&["ls-remote", "--heads", &self.remote, &refspec])?;
        Ok(!output.is_empty())
    }

    fn fetch(&mut self) -> GitResult<()> {
        debug!(remote = %self.remote, "fetch");
        self.run(&["fetch", &self.remote])?;
        Ok(())
    }

    fn pull(&mut self, branch: &str) -> GitResult<()> {
        self.checkout(branch)?;
        debug!(branch, "pull");
        self.run(&["pull", &self.remote, branch])?;
        Ok(())
    }

    fn checkout(&mut self, branch: &str) -> GitResult<()> {
        if self.current_branch.as_deref() == Some(branch) {
            return Ok(());
        }
        // Invalidate before the call: a failed checkout leaves the tree in an
        // unknown branch state.
        self.current_branch = None;
        self.run(&["checkout", branch])?;
        self.current_branch = Some(branch.to_string());
        Ok(())
    }

    fn create_branch(&mut self, from: &str, to: &str) -> GitResult<()> {
        self.checkout(from)?;
        self.current_branch = None;
        debug!(from, to, "create branch");
        self.run(&["checkout", "-b", to])?;
        self.current_branch = Some(to.to_string());
        Ok(())
    }

    fn empty_commit(&mut self, message: &str) -> GitResult<()> {
        Self::run_cmd(
            self.commit_command(),
            &["commit", "--allow-empty", "-m", message],
        )?;
        Ok(())
    }

    fn merge(&mut self, target: &str, source: &str, no_ff: bool) -> GitResult<MergeOutcome> {
        self.checkout(target)?;

        let message = format!("Merge {source} into {target}");
        let mut args = vec!["merge", "--no-edit", "-m", &message];
        if no_ff {
            args.push("--no-ff");
        }
        args.push(source);

        let output = self.commit_command().args(&args).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if stdout.contains("Already up to date") {
                return Ok(MergeOutcome::AlreadyUpToDate);
            }
            let commit = self.rev_parse("HEAD")?;
            return Ok(MergeOutcome::Merged { commit });
        }

        // git reports conflicts on stdout, not stderr.
        let combined = format!("{stdout}{stderr}");
        if combined.contains("CONFLICT") || combined.contains("Automatic merge failed") {
            return Ok(MergeOutcome::Conflict {
                conflicting_files: self.conflicting_files()?,
            });
        }

        Err(GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr: stderr.trim().to_string(),
        })
    }

    fn rebase(&mut self, branch: &str, onto: &str) -> GitResult<()> {
        self.checkout(branch)?;
        if let Err(err) = self.run(&["rebase", onto]) {
            // Never leave the tree mid-rebase.
            let _ = self.run(&["rebase", "--abort"]);
            return Err(err);
        }
        Ok(())
    }

    fn push(&mut self, branch: &str, force: bool) -> GitResult<()> {
        let mut args = vec!["push", self.remote.as_str()];
        if force {
            args.push("--force-with-lease");
        }
        args.push(branch);

        debug!(branch, force, "push");
        match self.run(&args) {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed { stderr, .. }) if stderr.contains("rejected") => {
                Err(GitError::PushRejected {
                    branch: branch.to_string(),
                    details: stderr,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn delete_branch(&mut self, branch: &str) -> GitResult<()> {
        self.run(&["branch", "-D", branch])?;
        Ok(())
    }

    fn delete_remote_branch(&mut self, branch: &str) -> GitResult<()> {
        self.run(&["push", &self.remote, "--delete", branch])?;
        Ok(())
    }

    fn latest_commit(&mut self, branch: &str) -> GitResult<CommitInfo> {
        let format = format!("--format=%H{LOG_SEP}%cI{LOG_SEP}%s{LOG_SEP}%an");
        let line = match self.run_stdout(&["log", "-1", &format, branch, "--"]) {
            Ok(line) => line,
            Err(GitError::CommandFailed { stderr, .. })
                if stderr.contains("unknown revision") =>
            {
                return Err(GitError::RefNotFound(branch.to_string()));
            }
            Err(err) => return Err(err),
        };

        let mut parts = line.splitn(4, LOG_SEP);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(hash), Some(date), Some(message), Some(author)) => Ok(CommitInfo {
                hash: Sha::parse(hash).map_err(GitError::UnexpectedOutput)?,
                date: date.to_string(),
                message: message.to_string(),
                author: author.to_string(),
            }),
            _ => Err(GitError::UnexpectedOutput(line)),
        }
    }

    fn abort_merge(&mut self) -> GitResult<()> {
        self.run(&["merge", "--abort"])?;
        Ok(())
    }

    fn hard_reset(&mut self, target: &str) -> GitResult<()> {
        self.run(&["reset", "--hard", target])?;
        Ok(())
    }
}

/// Dry-run execution policy over any backend.
///
/// Queries (existence checks, fingerprints, fetch) go through to the real
/// backend so every precondition is evaluated exactly as in a live run.
/// Mutations are logged and succeed without touching the repository.
/// Branches "created" during the dry run are remembered so later existence
/// checks and fingerprint reads against them resolve to the branch they
/// would have been cut from.
#[derive(Debug)]
pub struct DryRunBackend<B> {
    inner: B,
    /// Pretend-created branches, mapped to the branch they were cut from.
    created: HashMap<String, String>,
}

impl<B> DryRunBackend<B> {
    pub fn new(inner: B) -> Self {
        DryRunBackend {
            inner,
            created: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    /// Follows pretend-created branches back to a branch the real backend
    /// knows about.
    fn resolve<'a>(&'a self, branch: &'a str) -> &'a str {
        let mut current = branch;
        while let Some(from) = self.created.get(current) {
            current = from;
        }
        current
    }
}

impl<B: VersionControlBackend> VersionControlBackend for DryRunBackend<B> {
    fn branch_exists(&mut self, branch: &str) -> GitResult<bool> {
        if self.created.contains_key(branch) {
            return Ok(true);
        }
        self.inner.branch_exists(branch)
    }

    fn remote_branch_exists(&mut self, branch: &str) -> GitResult<bool> {
        if self.created.contains_key(branch) {
            return Ok(false);
        }
        self.inner.remote_branch_exists(branch)
    }

    fn fetch(&mut self) -> GitResult<()> {
        self.inner.fetch()
    }

    fn pull(&mut self, branch: &str) -> GitResult<()> {
        info!(branch, "dry-run: skipping pull");
        Ok(())
    }

    fn checkout(&mut self, branch: &str) -> GitResult<()> {
        info!(branch, "dry-run: skipping checkout");
        Ok(())
    }

    fn create_branch(&mut self, from: &str, to: &str) -> GitResult<()> {
        info!(from, to, "dry-run: skipping branch creation");
        self.created.insert(to.to_string(), from.to_string());
        Ok(())
    }

    fn empty_commit(&mut self, message: &str) -> GitResult<()> {
        info!(message, "dry-run: skipping empty commit");
        Ok(())
    }

    fn merge(&mut self, target: &str, source: &str, no_ff: bool) -> GitResult<MergeOutcome> {
        info!(target, source, no_ff, "dry-run: skipping merge");
        Ok(MergeOutcome::AlreadyUpToDate)
    }

    fn rebase(&mut self, branch: &str, onto: &str) -> GitResult<()> {
        info!(branch, onto, "dry-run: skipping rebase");
        Ok(())
    }

    fn push(&mut self, branch: &str, force: bool) -> GitResult<()> {
        info!(branch, force, "dry-run: skipping push");
        Ok(())
    }

    fn delete_branch(&mut self, branch: &str) -> GitResult<()> {
        info!(branch, "dry-run: skipping branch deletion");
        Ok(())
    }

    fn delete_remote_branch(&mut self, branch: &str) -> GitResult<()> {
        info!(branch, "dry-run: skipping remote branch deletion");
        Ok(())
    }

    fn latest_commit(&mut self, branch: &str) -> GitResult<CommitInfo> {
        let resolved = self.resolve(branch).to_string();
        self.inner.latest_commit(&resolved)
    }

    fn abort_merge(&mut self) -> GitResult<()> {
        info!("dry-run: skipping merge abort");
        Ok(())
    }

    fn hard_reset(&mut self, target: &str) -> GitResult<()> {
        info!(target, "dry-run: skipping hard reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity() -> CommitIdentity {
        CommitIdentity {
            name: "Test".to_string(),
            email: "test@test.com".to_string(),
        }
    }

    fn run_git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .current_dir(dir)
            .args([
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@test.com",
            ])
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// A working repo on branch `develop` with a bare `origin` holding the
    /// same initial commit.
    fn create_test_repo() -> (TempDir, GitSession) {
        let temp = TempDir::new().unwrap();
        let origin = temp.path().join("origin");
        let work = temp.path().join("work");
        std::fs::create_dir_all(&origin).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        run_git(&origin, &["init", "--bare", "-b", "develop"]);
        run_git(&work, &["init", "-b", "develop"]);
        run_git(&work, &["remote", "add", "origin", origin.to_str().unwrap()]);

        std::fs::write(work.join("README.md"), "# Test").unwrap();
        run_git(&work, &["add", "."]);
        run_git(&work, &["commit", "-m", "Initial commit"]);
        run_git(&work, &["push", "-u", "origin", "develop"]);

        let session = GitSession::new(&work, "origin", Some(identity()));
        (temp, session)
    }

    fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        run_git(dir, &["add", name]);
        run_git(dir, &["commit", "-m", message]);
    }

    #[test]
    fn branch_existence_local_and_remote() {
        let (_temp, mut session) = create_test_repo();

        assert!(session.branch_exists("develop").unwrap());
        assert!(!session.branch_exists("2025-09-15").unwrap());
        assert!(session.remote_branch_exists("develop").unwrap());
        assert!(!session.remote_branch_exists("2025-09-15").unwrap());
    }

    #[test]
    fn create_branch_empty_commit_and_fingerprint() {
        let (_temp, mut session) = create_test_repo();

        session.create_branch("develop", "2025-09-15").unwrap();
        session.empty_commit("start cycle 2025-09-15").unwrap();

        let commit = session.latest_commit("2025-09-15").unwrap();
        assert_eq!(commit.message, "start cycle 2025-09-15");
        assert_eq!(commit.author, "Test");

        // The marker commit gives the branch its own history.
        let base = session.latest_commit("develop").unwrap();
        assert_ne!(commit.hash, base.hash);
    }

    #[test]
    fn push_makes_branch_visible_on_remote() {
        let (_temp, mut session) = create_test_repo();

        session.create_branch("develop", "2025-09-15").unwrap();
        session.empty_commit("start cycle 2025-09-15").unwrap();
        session.push("2025-09-15", false).unwrap();

        assert!(session.remote_branch_exists("2025-09-15").unwrap());
    }

    #[test]
    fn merge_fast_forward_and_no_ff() {
        let (temp, mut session) = create_test_repo();
        let work = temp.path().join("work");

        session.create_branch("develop", "feature").unwrap();
        commit_file(&work, "feature.txt", "content", "Add feature");

        // Fast-forward allowed: develop moves to the feature head.
        let outcome = session.merge("develop", "feature", false).unwrap();
        assert!(outcome.is_clean());
        let develop = session.latest_commit("develop").unwrap();
        let feature = session.latest_commit("feature").unwrap();
        assert_eq!(develop.hash, feature.hash);

        // Merging again is a no-op.
        let outcome = session.merge("develop", "feature", false).unwrap();
        assert_eq!(outcome, MergeOutcome::AlreadyUpToDate);

        // --no-ff on fresh history creates an explicit merge commit.
        session.create_branch("develop", "feature2").unwrap();
        commit_file(&work, "feature2.txt", "content", "Add feature2");
        let outcome = session.merge("develop", "feature2", true).unwrap();
        match outcome {
            MergeOutcome::Merged { commit } => {
                let head = session.latest_commit("develop").unwrap();
                assert_eq!(head.hash, commit);
                assert!(head.message.starts_with("Merge feature2 into develop"));
            }
            other => panic!("expected merge commit, got {other:?}"),
        }
    }

    #[test]
    fn merge_conflict_is_an_outcome_and_abort_recovers() {
        let (temp, mut session) = create_test_repo();
        let work = temp.path().join("work");

        commit_file(&work, "conflict.txt", "version 1", "Version 1");
        run_git(&work, &["checkout", "-b", "hotfix", "HEAD~1"]);
        commit_file(&work, "conflict.txt", "version 2", "Version 2");
        // The session's cache does not know about the raw checkout above.
        session.current_branch = None;

        let outcome = session.merge("develop", "hotfix", false).unwrap();
        match outcome {
            MergeOutcome::Conflict { conflicting_files } => {
                assert_eq!(conflicting_files, ["conflict.txt"]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        session.abort_merge().unwrap();
        assert!(session.conflicting_files().unwrap().is_empty());
    }

    #[test]
    fn rebase_replays_branch_onto_new_base() {
        let (temp, mut session) = create_test_repo();
        let work = temp.path().join("work");

        session.create_branch("develop", "feature").unwrap();
        commit_file(&work, "feature.txt", "content", "Add feature");

        session.checkout("develop").unwrap();
        commit_file(&work, "base.txt", "content", "Advance develop");

        session.rebase("feature", "develop").unwrap();

        // The rebased branch carries both its own and develop's files.
        assert!(work.join("feature.txt").exists());
        assert!(work.join("base.txt").exists());
    }

    #[test]
    fn latest_commit_on_unknown_branch_is_ref_not_found() {
        let (_temp, mut session) = create_test_repo();
        let err = session.latest_commit("no-such-branch").unwrap_err();
        assert!(matches!(err, GitError::RefNotFound(_)));
    }

    #[test]
    fn delete_branch_removes_it() {
        let (_temp, mut session) = create_test_repo();

        session.create_branch("develop", "old-cycle").unwrap();
        session.push("old-cycle", false).unwrap();
        session.checkout("develop").unwrap();

        session.delete_branch("old-cycle").unwrap();
        session.delete_remote_branch("old-cycle").unwrap();

        assert!(!session.branch_exists("old-cycle").unwrap());
        assert!(!session.remote_branch_exists("old-cycle").unwrap());
    }

    #[test]
    fn dry_run_forwards_queries_and_skips_mutations() {
        let (_temp, session) = create_test_repo();
        let mut dry = DryRunBackend::new(session);

        assert!(dry.branch_exists("develop").unwrap());

        dry.create_branch("develop", "2025-09-15").unwrap();
        dry.empty_commit("start cycle").unwrap();
        dry.push("2025-09-15", false).unwrap();

        // The pretend branch exists for the gate and resolves fingerprints
        // to the branch it was cut from.
        assert!(dry.branch_exists("2025-09-15").unwrap());
        let fingerprint = dry.latest_commit("2025-09-15").unwrap();
        let develop = dry.latest_commit("develop").unwrap();
        assert_eq!(fingerprint.hash, develop.hash);

        // Nothing actually happened.
        let mut session = dry.into_inner();
        assert!(!session.branch_exists("2025-09-15").unwrap());
    }
}
