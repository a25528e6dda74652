//! Off-cycle touch-up sweep.
//!
//! Between cycle boundaries the date-branches are the synchronization
//! anchors: anything landed directly on an environment branch (hotfixes,
//! late merges) is folded into the branch that environment tracks, so the
//! next rotation carries it forward. Each pair is skipped when the source's
//! head equals the recorded fingerprint.
//!
//! A failing pair never aborts the sweep: one broken environment must not
//! block syncing the others. The sweep as a whole is reported degraded
//! instead.

use tracing::{info, warn};

use super::{CycleResult, SlotAction, SlotReport, StatusPersister};
use crate::clock;
use crate::config::Config;
use crate::git::{GitError, MergeOutcome, VersionControlBackend, recovery};
use crate::status::StatusStore;
use crate::types::Environment;

/// One source → target sync to evaluate.
struct SweepPair {
    /// Slot whose fingerprint gates and records the sync. The pending
    /// ahead-of-cycle branch has no slot.
    env: Option<Environment>,
    source: String,
    target: String,
}

/// All pairs the sweep considers: every slot with a recorded target, plus
/// the ahead-of-cycle branch when one has already been cut.
fn collect_pairs(config: &Config, status: &StatusStore) -> Vec<SweepPair> {
    let mut pairs = Vec::new();

    for env in Environment::ALL {
        if let Some(target) = status.target(env) {
            // Right after a first run a slot can still point at another
            // environment branch; only date anchors are sweep targets.
            if config.environment_branches().contains(&target) {
                continue;
            }
            pairs.push(SweepPair {
                env: Some(env),
                source: config.branch(env).to_string(),
                target: target.to_string(),
            });
        }
    }

    if let Some(ahead) = status.ahead_cycle_date()
        && let Ok(date) = clock::parse_date(ahead, &config.date_format)
    {
        let branch = clock::branch_name(&config.branch_prefix, date, &config.date_format);
        if status.target(Environment::Base) != Some(branch.as_str()) {
            pairs.push(SweepPair {
                env: None,
                source: config.base_branch.clone(),
                target: branch,
            });
        }
    }

    pairs
}

/// Runs the sweep, persisting the store after every slot it mutates.
pub(crate) fn run_sweep<B: VersionControlBackend + ?Sized>(
    config: &Config,
    backend: &mut B,
    status: &mut StatusStore,
    persister: &mut dyn StatusPersister,
) -> CycleResult<Vec<SlotReport>> {
    let mut reports = Vec::new();

    for pair in collect_pairs(config, status) {
        let Some(action) = sync_pair(backend, status, persister, &pair)? else {
            continue;
        };
        match &action {
            SlotAction::Unchanged => info!(source = %pair.source, target = %pair.target, "unchanged"),
            SlotAction::Synced => info!(source = %pair.source, target = %pair.target, "synced"),
            SlotAction::Failed { reason } => {
                warn!(source = %pair.source, target = %pair.target, reason, "sync failed")
            }
        }
        reports.push(SlotReport {
            source: pair.source,
            target: pair.target,
            action,
        });
    }

    Ok(reports)
}

fn sync_pair<B: VersionControlBackend + ?Sized>(
    backend: &mut B,
    status: &mut StatusStore,
    persister: &mut dyn StatusPersister,
    pair: &SweepPair,
) -> CycleResult<Option<SlotAction>> {
    // The ahead-of-cycle branch may not have been cut yet; nothing to do.
    if pair.env.is_none() {
        match target_exists(backend, &pair.target) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(err) => return Ok(Some(failed(err))),
        }
    }

    let head = match backend.latest_commit(&pair.source) {
        Ok(head) => head,
        Err(err) => return Ok(Some(failed(err))),
    };

    if let Some(env) = pair.env
        && let Some(fingerprint) = status.fingerprint(env)
        && fingerprint.matches(&head.hash)
    {
        return Ok(Some(SlotAction::Unchanged));
    }

    match backend.merge(&pair.target, &pair.source, false) {
        Ok(MergeOutcome::Conflict { conflicting_files }) => {
            // Cleanup failure here is fatal: an unrecovered tree would break
            // every remaining pair.
            recovery::recover_from_conflict(backend, &pair.target).map_err(|source| {
                super::CycleError::GitOperationFailed {
                    step: format!("recover {}", pair.target),
                    source,
                }
            })?;
            Ok(Some(SlotAction::Failed {
                reason: format!("merge conflict ({} files)", conflicting_files.len()),
            }))
        }
        Ok(outcome) => {
            if let MergeOutcome::Merged { .. } = outcome
                && let Err(err) = backend.push(&pair.target, false)
            {
                return Ok(Some(failed(err)));
            }
            if let Some(env) = pair.env {
                // Record the *source* head: the next sweep compares the
                // source against this value, so the skip fires as long as
                // nothing new lands.
                status.set_fingerprint(env, head);
                persister.persist(status)?;
            }
            Ok(Some(SlotAction::Synced))
        }
        Err(err) => Ok(Some(failed(err))),
    }
}

fn target_exists<B: VersionControlBackend + ?Sized>(
    backend: &mut B,
    branch: &str,
) -> Result<bool, GitError> {
    Ok(backend.branch_exists(branch)? || backend.remote_branch_exists(branch)?)
}

fn failed(err: GitError) -> SlotAction {
    SlotAction::Failed {
        reason: err.to_string(),
    }
}
