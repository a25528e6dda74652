//! Persisted run status: per-environment targets, cycle ledger, tracked
//! branches.
//!
//! The store is the resumability contract: the orchestrator writes it back
//! after every phase that mutates it, so a crash between two git operations
//! never forces redoing already-applied work. Two on-disk shapes exist (a
//! legacy flat string-per-slot form and the current object-with-commit form);
//! both normalize to the same in-memory model on load, and whichever shape
//! was loaded is reproduced on save.

mod codec;

pub use codec::{StatusError, load, save};

use crate::types::{CommitInfo, Environment, EnvironmentSlot, TrackedBranch};

/// Which on-disk shape a store was loaded from (and will be saved as).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusShape {
    /// Legacy shape: each slot is a bare branch-name string.
    Flat,
    /// Current shape: each slot is an object with branch + commit fingerprint.
    Rich,
}

/// In-memory status model (always the rich form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusStore {
    slots: [EnvironmentSlot; 4],
    last_cycle_date: Option<String>,
    ahead_cycle_date: Option<String>,
    branches: Vec<TrackedBranch>,
    shape: StatusShape,
}

impl Default for StatusStore {
    fn default() -> Self {
        StatusStore::empty()
    }
}

impl StatusStore {
    /// An empty store, as used on first run. New stores persist in the rich
    /// shape.
    pub fn empty() -> Self {
        StatusStore {
            slots: Default::default(),
            last_cycle_date: None,
            ahead_cycle_date: None,
            branches: Vec::new(),
            shape: StatusShape::Rich,
        }
    }

    /// The on-disk shape this store round-trips to.
    pub fn shape(&self) -> StatusShape {
        self.shape
    }

    /// True when no environment has a recorded target yet. A first run treats
    /// any day as an execution day.
    pub fn is_first_run(&self) -> bool {
        self.slots.iter().all(EnvironmentSlot::is_unset)
    }

    pub fn slot(&self, env: Environment) -> &EnvironmentSlot {
        &self.slots[env.index()]
    }

    pub(crate) fn slot_mut(&mut self, env: Environment) -> &mut EnvironmentSlot {
        &mut self.slots[env.index()]
    }

    /// The branch an environment currently tracks.
    pub fn target(&self, env: Environment) -> Option<&str> {
        self.slot(env).target_branch.as_deref()
    }

    /// The fingerprint recorded at the last successful sync of a slot.
    pub fn fingerprint(&self, env: Environment) -> Option<&CommitInfo> {
        self.slot(env).last_commit.as_ref()
    }

    /// Points an environment at a branch.
    ///
    /// When no fingerprint is supplied, a previously recorded one is
    /// preserved rather than cleared.
    pub fn set_target(
        &mut self,
        env: Environment,
        branch: impl Into<String>,
        fingerprint: Option<CommitInfo>,
    ) {
        let slot = self.slot_mut(env);
        slot.target_branch = Some(branch.into());
        if let Some(fingerprint) = fingerprint {
            slot.last_commit = Some(fingerprint);
        }
    }

    /// Replaces the recorded fingerprint of a slot.
    pub fn set_fingerprint(&mut self, env: Environment, fingerprint: CommitInfo) {
        self.slot_mut(env).last_commit = Some(fingerprint);
    }

    pub fn last_cycle_date(&self) -> Option<&str> {
        self.last_cycle_date.as_deref()
    }

    pub fn ahead_cycle_date(&self) -> Option<&str> {
        self.ahead_cycle_date.as_deref()
    }

    /// Records the executed cycle boundary and the one ahead of it.
    pub fn set_cycle_dates(&mut self, last: impl Into<String>, ahead: impl Into<String>) {
        self.last_cycle_date = Some(last.into());
        self.ahead_cycle_date = Some(ahead.into());
    }

    /// Date-branches created by past cycles, oldest first.
    pub fn tracked_branches(&self) -> &[TrackedBranch] {
        &self.branches
    }

    /// Remembers a date-branch for retention. Re-tracking a branch that is
    /// already on the list (a resumed run) is a no-op.
    pub fn track_branch(&mut self, branch: impl Into<String>, time: i64) {
        let branch = branch.into();
        if self.branches.iter().any(|b| b.branch == branch) {
            return;
        }
        self.branches.push(TrackedBranch { branch, time });
    }

    /// Forgets a tracked branch after a deletion attempt.
    pub fn untrack_branch(&mut self, branch: &str) {
        self.branches.retain(|b| b.branch != branch);
    }

    pub(crate) fn restore(
        slots: [EnvironmentSlot; 4],
        last_cycle_date: Option<String>,
        ahead_cycle_date: Option<String>,
        branches: Vec<TrackedBranch>,
        shape: StatusShape,
    ) -> Self {
        StatusStore {
            slots,
            last_cycle_date,
            ahead_cycle_date,
            branches,
            shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sha;

    fn fingerprint(n: u8) -> CommitInfo {
        CommitInfo {
            hash: Sha::new(format!("{:0>40x}", n)),
            date: "2025-09-01T10:00:00+00:00".to_string(),
            message: "promote".to_string(),
            author: "release-bot".to_string(),
        }
    }

    #[test]
    fn empty_store_is_first_run() {
        let store = StatusStore::empty();
        assert!(store.is_first_run());
        assert_eq!(store.shape(), StatusShape::Rich);
        for env in Environment::ALL {
            assert!(store.target(env).is_none());
        }
    }

    #[test]
    fn set_target_without_fingerprint_preserves_previous() {
        let mut store = StatusStore::empty();
        store.set_target(Environment::Uat, "2025-09-01", Some(fingerprint(1)));
        store.set_target(Environment::Uat, "2025-09-15", None);

        assert_eq!(store.target(Environment::Uat), Some("2025-09-15"));
        assert_eq!(store.fingerprint(Environment::Uat), Some(&fingerprint(1)));
    }

    #[test]
    fn set_target_with_fingerprint_replaces_previous() {
        let mut store = StatusStore::empty();
        store.set_target(Environment::Pro, "2025-08-04", Some(fingerprint(1)));
        store.set_target(Environment::Pro, "2025-08-18", Some(fingerprint(2)));

        assert_eq!(store.fingerprint(Environment::Pro), Some(&fingerprint(2)));
    }

    #[test]
    fn track_branch_is_idempotent() {
        let mut store = StatusStore::empty();
        store.track_branch("2025-09-15", 100);
        store.track_branch("2025-09-15", 200);

        assert_eq!(store.tracked_branches().len(), 1);
        assert_eq!(store.tracked_branches()[0].time, 100);
    }

    #[test]
    fn untrack_branch_removes_entry() {
        let mut store = StatusStore::empty();
        store.track_branch("2025-09-01", 100);
        store.track_branch("2025-09-15", 200);
        store.untrack_branch("2025-09-01");

        let names: Vec<_> = store.tracked_branches().iter().map(|b| &b.branch).collect();
        assert_eq!(names, ["2025-09-15"]);
    }
}
