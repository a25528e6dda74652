//! The cycle engine: decide the flow for a reference day and drive it.
//!
//! A full cycle is a strict total order of steps; each one is pushed
//! upstream immediately on success and the slot state it establishes is
//! persisted before the next step starts. Later steps depend on branches the
//! earlier ones created, so nothing here is reorderable or parallel.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{NaiveDate, Utc};
use tracing::info;

use super::{
    CycleError, CycleResult, FlowKind, RunReport, StatusPersister, retention, sweep,
};
use crate::clock::{self, CycleBoundary};
use crate::config::Config;
use crate::git::{GitResult, MergeOutcome, VersionControlBackend, recovery};
use crate::status::StatusStore;
use crate::types::Environment;

/// Drives one run against a backend.
pub struct CycleEngine<'a, B: ?Sized> {
    config: &'a Config,
    backend: &'a mut B,
    cancel: Option<&'a AtomicBool>,
    now_millis: i64,
}

impl<'a, B: VersionControlBackend + ?Sized> CycleEngine<'a, B> {
    pub fn new(config: &'a Config, backend: &'a mut B) -> Self {
        CycleEngine {
            config,
            backend,
            cancel: None,
            now_millis: Utc::now().timestamp_millis(),
        }
    }

    /// Installs a cancellation flag, honored at step boundaries only.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Overrides the wall-clock timestamp used for branch tracking and
    /// retention cutoffs.
    pub fn with_now_millis(mut self, now_millis: i64) -> Self {
        self.now_millis = now_millis;
        self
    }

    /// Runs the flow for `today`: the full rotation on an execution day, the
    /// touch-up sweep otherwise.
    pub fn run(
        &mut self,
        status: &mut StatusStore,
        today: NaiveDate,
        persister: &mut dyn StatusPersister,
    ) -> CycleResult<RunReport> {
        let last_cycle = match status.last_cycle_date() {
            Some(raw) => Some(clock::parse_date(raw, &self.config.date_format)?),
            None => None,
        };
        let boundary = clock::cycle_boundary(today, last_cycle, self.config.cycle_days);

        if clock::is_execution_day(today, last_cycle, self.config.cycle_days) {
            info!(
                current = %boundary.current,
                next = %boundary.next,
                "execution day, running full cycle"
            );
            self.full_cycle(status, boundary, persister)
        } else {
            info!(next = %boundary.next, "off-cycle day, running touch-up sweep");
            let sweep = sweep::run_sweep(self.config, self.backend, status, persister)?;
            Ok(RunReport {
                flow: FlowKind::OffCycle,
                boundary,
                cycle_branch: None,
                sweep,
                removed_branches: Vec::new(),
            })
        }
    }

    fn full_cycle(
        &mut self,
        status: &mut StatusStore,
        boundary: CycleBoundary,
        persister: &mut dyn StatusPersister,
    ) -> CycleResult<RunReport> {
        let config = self.config;

        // 1. Bring the root branch up to date.
        self.checkpoint("fetch")?;
        critical("fetch", self.backend.fetch())?;
        critical("pull base", self.backend.pull(&config.base_branch))?;

        // 2. Rotation targets. Chain collapse: each environment inherits its
        // upstream neighbor's recorded target directly, so multi-cycle drift
        // closes in one rotation instead of one hop per cycle. Unset slots
        // (first run) fall back to the environment branches themselves.
        let cycle_branch =
            clock::branch_name(&config.branch_prefix, boundary.current, &config.date_format);
        let uat_source = status
            .target(Environment::Base)
            .unwrap_or(&config.base_branch)
            .to_string();
        let pro_source = status
            .target(Environment::Uat)
            .unwrap_or(&config.uat_branch)
            .to_string();

        // 3. Existence gate: everything the flow is about to read must exist
        // before any mutating step runs.
        let mut required: Vec<&str> = vec![
            &config.base_branch,
            &config.uat_branch,
            &config.pre_branch,
            &config.pro_branch,
            &uat_source,
            &pro_source,
        ];
        let mut seen = Vec::with_capacity(required.len());
        required.retain(|branch| {
            let fresh = !seen.contains(branch);
            seen.push(branch);
            fresh
        });
        for branch in required {
            if !critical("branch check", self.exists_anywhere(branch))? {
                return Err(CycleError::MissingBranch {
                    branch: branch.to_string(),
                    remote: config.remote_name.clone(),
                });
            }
        }

        // 4. Cut (or re-merge) the date-branch for this boundary.
        self.checkpoint("cycle branch")?;
        if critical("branch check", self.exists_anywhere(&cycle_branch))? {
            // A previous (possibly interrupted) run already cut it.
            self.promotion_merge(&cycle_branch, &config.base_branch, false)?;
        } else {
            critical(
                "create cycle branch",
                self.backend.create_branch(&config.base_branch, &cycle_branch),
            )?;
            // The marker commit gives the branch independent history, so
            // branches cut from it later are well-formed.
            critical(
                "marker commit",
                self.backend
                    .empty_commit(&format!("Start cycle {cycle_branch}")),
            )?;
            critical("push cycle branch", self.backend.push(&cycle_branch, false))?;
        }
        let base_head = critical("fingerprint", self.backend.latest_commit(&cycle_branch))?;
        status.set_target(Environment::Base, &cycle_branch, Some(base_head));
        persister.persist(status)?;

        // 5.–7. Promote through the environments, durably one at a time.
        self.promote(status, persister, Environment::Uat, &uat_source, false)?;
        self.promote(status, persister, Environment::Pre, &uat_source, true)?;
        self.promote(status, persister, Environment::Pro, &pro_source, true)?;

        // 8.–9. Remember the new branch and advance the ledger.
        status.track_branch(&cycle_branch, self.now_millis);
        status.set_cycle_dates(
            clock::format_date(boundary.current, &config.date_format),
            clock::format_date(boundary.next, &config.date_format),
        );
        persister.persist(status)?;

        // 10. One more sweep to pick up anything that landed while the
        // cycle was running.
        self.checkpoint("post-cycle sweep")?;
        let sweep = sweep::run_sweep(config, self.backend, status, persister)?;

        let removed_branches = if config.auto_remove_branches && !config.branch_prefix.is_empty() {
            let removed =
                retention::sweep_expired(config, self.backend, status, self.now_millis);
            if !removed.is_empty() {
                persister.persist(status)?;
            }
            removed
        } else {
            Vec::new()
        };

        Ok(RunReport {
            flow: FlowKind::FullCycle,
            boundary,
            cycle_branch: Some(cycle_branch),
            sweep,
            removed_branches,
        })
    }

    /// One promotion step: merge `source` into the environment's branch, push
    /// it, and re-point the slot at `source` with a fresh fingerprint.
    fn promote(
        &mut self,
        status: &mut StatusStore,
        persister: &mut dyn StatusPersister,
        env: Environment,
        source: &str,
        no_ff: bool,
    ) -> CycleResult<()> {
        let env_branch = self.config.branch(env).to_string();
        self.checkpoint(&format!("promote {env}"))?;
        self.promotion_merge(&env_branch, source, no_ff)?;

        // The fingerprint is the post-merge head of the environment branch:
        // the next sweep compares that branch's head against it, so a cycle
        // that landed cleanly reads as unchanged.
        let fingerprint = critical("fingerprint", self.backend.latest_commit(&env_branch))?;
        status.set_target(env, source, Some(fingerprint));
        persister.persist(status)?;
        Ok(())
    }

    /// A critical merge + push. A conflict recovers the tree and aborts the
    /// run; completed earlier steps stay persisted.
    fn promotion_merge(&mut self, target: &str, source: &str, no_ff: bool) -> CycleResult<()> {
        let step = format!("merge {source} into {target}");
        match critical(&step, self.backend.merge(target, source, no_ff))? {
            MergeOutcome::Conflict { conflicting_files } => {
                critical(
                    &format!("recover {target}"),
                    recovery::recover_from_conflict(self.backend, target).map(|_| ()),
                )?;
                Err(CycleError::PromotionConflict {
                    target_branch: target.to_string(),
                    source_branch: source.to_string(),
                    files: conflicting_files,
                })
            }
            MergeOutcome::Merged { .. } => {
                critical(&format!("push {target}"), self.backend.push(target, false))
            }
            MergeOutcome::AlreadyUpToDate => Ok(()),
        }
    }

    fn exists_anywhere(&mut self, branch: &str) -> GitResult<bool> {
        Ok(self.backend.branch_exists(branch)?
            || self.backend.remote_branch_exists(branch)?)
    }

    fn checkpoint(&self, step: &str) -> CycleResult<()> {
        if let Some(flag) = self.cancel
            && flag.load(Ordering::Relaxed)
        {
            return Err(CycleError::Cancelled(step.to_string()));
        }
        Ok(())
    }
}

fn critical<T>(step: &str, result: GitResult<T>) -> CycleResult<T> {
    result.map_err(|source| CycleError::GitOperationFailed {
        step: step.to_string(),
        source,
    })
}
