//! Retention sweep for expired date-branches.
//!
//! Runs only after a successful full cycle, and only when branch removal is
//! enabled and a non-empty prefix is configured: with no prefix, a stray
//! tracking entry could name an unrelated branch, so nothing is deleted.
//! Deletions are best-effort; a tracked entry is dropped after the attempt
//! whether or not it succeeded, so a permanently undeletable branch cannot
//! grow an unbounded retry backlog.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::Config;
use crate::git::VersionControlBackend;
use crate::status::StatusStore;
use crate::types::Environment;

const DAY_MILLIS: i64 = 86_400_000;

/// Deletes tracked branches older than the retention window.
///
/// Never candidates, regardless of age: the four environment branches, any
/// branch outside the configured prefix, and any branch that is currently an
/// environment slot's target (a long gap between runs must not prune an
/// anchor still in use). Returns the branches whose deletion was attempted.
pub(crate) fn sweep_expired<B: VersionControlBackend + ?Sized>(
    config: &Config,
    backend: &mut B,
    status: &mut StatusStore,
    now_millis: i64,
) -> Vec<String> {
    let window = i64::from(config.branch_retention_cycles) * i64::from(config.cycle_days);
    let cutoff = now_millis - window * DAY_MILLIS;

    let protected: HashSet<String> = Environment::ALL
        .iter()
        .filter_map(|env| status.target(*env).map(String::from))
        .chain(config.environment_branches().map(String::from))
        .collect();

    let expired: Vec<String> = status
        .tracked_branches()
        .iter()
        .filter(|tracked| tracked.time < cutoff)
        .map(|tracked| tracked.branch.clone())
        .collect();

    let mut removed = Vec::new();
    for branch in expired {
        if !branch.starts_with(&config.branch_prefix) {
            warn!(branch, "tracked branch outside the configured prefix, leaving it alone");
            continue;
        }
        if protected.contains(&branch) {
            info!(branch, "expired branch still targeted by an environment, keeping");
            continue;
        }

        if let Err(err) = backend.delete_branch(&branch) {
            warn!(branch, error = %err, "local branch deletion failed");
        }
        if let Err(err) = backend.delete_remote_branch(&branch) {
            warn!(branch, error = %err, "remote branch deletion failed");
        }

        status.untrack_branch(&branch);
        info!(branch, "retired expired cycle branch");
        removed.push(branch);
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeBackend;

    fn config() -> Config {
        Config {
            branch_prefix: "release/".to_string(),
            auto_remove_branches: true,
            branch_retention_cycles: 3,
            cycle_days: 14,
            ..Config::default()
        }
    }

    fn days_ago(now: i64, days: i64) -> i64 {
        now - days * DAY_MILLIS
    }

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn forty_five_day_old_branch_is_deleted_but_forty_is_not() {
        let mut backend = FakeBackend::new();
        backend.add_branch("release/old");
        backend.add_branch("release/recent");

        let mut status = StatusStore::empty();
        status.track_branch("release/old", days_ago(NOW, 45));
        status.track_branch("release/recent", days_ago(NOW, 40));

        let removed = sweep_expired(&config(), &mut backend, &mut status, NOW);

        assert_eq!(removed, ["release/old"]);
        assert!(!backend.local_branches.contains("release/old"));
        assert!(!backend.remote_branches.contains("release/old"));
        assert!(backend.local_branches.contains("release/recent"));

        let tracked: Vec<_> = status
            .tracked_branches()
            .iter()
            .map(|b| b.branch.as_str())
            .collect();
        assert_eq!(tracked, ["release/recent"]);
    }

    #[test]
    fn branch_still_targeted_by_a_slot_is_kept() {
        let mut backend = FakeBackend::new();
        backend.add_branch("release/ancient");

        let mut status = StatusStore::empty();
        status.track_branch("release/ancient", days_ago(NOW, 400));
        status.set_target(Environment::Pro, "release/ancient", None);

        let removed = sweep_expired(&config(), &mut backend, &mut status, NOW);

        assert!(removed.is_empty());
        assert!(backend.local_branches.contains("release/ancient"));
        assert_eq!(status.tracked_branches().len(), 1);
    }

    #[test]
    fn branch_outside_prefix_is_never_touched() {
        let mut backend = FakeBackend::new();
        backend.add_branch("hotfix/oops");

        let mut status = StatusStore::empty();
        status.track_branch("hotfix/oops", days_ago(NOW, 100));

        let removed = sweep_expired(&config(), &mut backend, &mut status, NOW);

        assert!(removed.is_empty());
        assert!(backend.local_branches.contains("hotfix/oops"));
    }

    #[test]
    fn environment_branch_is_never_a_candidate() {
        let mut backend = FakeBackend::new();
        backend.add_branch("develop");

        let mut config = config();
        // A prefix that makes the base branch name collide with the scheme.
        config.branch_prefix = "dev".to_string();

        let mut status = StatusStore::empty();
        status.track_branch("develop", days_ago(NOW, 100));

        let removed = sweep_expired(&config, &mut backend, &mut status, NOW);

        assert!(removed.is_empty());
        assert!(backend.local_branches.contains("develop"));
    }

    #[test]
    fn failed_deletion_still_drops_the_tracking_entry() {
        let mut backend = FakeBackend::new();
        backend.add_branch("release/stuck");
        backend
            .fail_delete_local
            .insert("release/stuck".to_string());
        backend
            .fail_delete_remote
            .insert("release/stuck".to_string());

        let mut status = StatusStore::empty();
        status.track_branch("release/stuck", days_ago(NOW, 60));

        let removed = sweep_expired(&config(), &mut backend, &mut status, NOW);

        // Attempted, failed, and forgotten: no unbounded retry growth.
        assert_eq!(removed, ["release/stuck"]);
        assert!(status.tracked_branches().is_empty());
        assert!(backend.local_branches.contains("release/stuck"));
    }
}
