//! Cycle orchestration.
//!
//! The orchestrator consumes the config, the status store and a
//! version-control backend, decides which flow applies to "today"
//! (full-cycle rotation at a boundary, fingerprint-skip touch-up sweep
//! otherwise), and drives the bounded sequence of branch operations for that
//! flow. The status store is handed to the [`StatusPersister`] after every
//! mutating step, which is what makes an interrupted run resumable: re-running
//! finds unchanged fingerprints and already-up-to-date merges and turns the
//! completed prefix into no-ops.

pub mod engine;
pub mod retention;
pub mod sweep;

pub use engine::CycleEngine;

use std::path::PathBuf;

use thiserror::Error;

use crate::clock::{ClockError, CycleBoundary};
use crate::git::GitError;
use crate::status::{self, StatusError, StatusStore};

/// Errors that abort a flow.
#[derive(Debug, Error)]
pub enum CycleError {
    /// A branch the flow is about to read or write does not exist locally or
    /// on the remote. Raised before any mutating step.
    #[error("required branch {branch} does not exist locally or on {remote}")]
    MissingBranch { branch: String, remote: String },

    /// A critical git operation failed.
    #[error("git operation failed during {step}: {source}")]
    GitOperationFailed {
        step: String,
        #[source]
        source: GitError,
    },

    /// A promotion merge hit conflicts. The working tree has already been
    /// recovered when this is raised.
    #[error("merge of {source_branch} into {target_branch} conflicted ({} files)", .files.len())]
    PromotionConflict {
        target_branch: String,
        source_branch: String,
        files: Vec<String>,
    },

    /// The status store could not be persisted (or loaded).
    #[error(transparent)]
    Status(#[from] StatusError),

    /// A recorded or supplied date does not parse under the configured format.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// A cancellation request was honored at a step boundary.
    #[error("run cancelled before step {0}")]
    Cancelled(String),
}

/// Result type for orchestrator operations.
pub type CycleResult<T> = Result<T, CycleError>;

/// Which flow a run executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Boundary day: rotate targets and cut a new date-branch.
    FullCycle,
    /// Any other day: touch-up sweep only.
    OffCycle,
}

/// What happened to one sweep pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotAction {
    /// Source fingerprint unchanged; no backend mutation was issued.
    Unchanged,
    /// Source merged into the target (or confirmed already present).
    Synced,
    /// The pair failed non-fatally; the sweep continued.
    Failed { reason: String },
}

/// Per-pair record of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReport {
    pub source: String,
    pub target: String,
    pub action: SlotAction,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub flow: FlowKind,
    pub boundary: CycleBoundary,
    /// The date-branch cut (or re-merged) by a full cycle.
    pub cycle_branch: Option<String>,
    pub sweep: Vec<SlotReport>,
    /// Tracked branches whose deletion was attempted by retention.
    pub removed_branches: Vec<String>,
}

impl RunReport {
    /// True when the flow completed but one or more sweep pairs failed.
    pub fn is_degraded(&self) -> bool {
        self.sweep
            .iter()
            .any(|slot| matches!(slot.action, SlotAction::Failed { .. }))
    }
}

/// Receives the store after every mutating step.
///
/// The file-backed implementation is the normal case; dry-run keeps the
/// in-memory updates for reporting without flushing anything.
pub trait StatusPersister {
    fn persist(&mut self, store: &StatusStore) -> Result<(), StatusError>;
}

/// Persists to the status file on every call.
#[derive(Debug)]
pub struct FilePersister {
    path: PathBuf,
}

impl FilePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePersister { path: path.into() }
    }
}

impl StatusPersister for FilePersister {
    fn persist(&mut self, store: &StatusStore) -> Result<(), StatusError> {
        status::save(&self.path, store)
    }
}

/// Dry-run policy: accept every persist without touching disk.
#[derive(Debug, Default)]
pub struct NoopPersister;

impl StatusPersister for NoopPersister {
    fn persist(&mut self, _store: &StatusStore) -> Result<(), StatusError> {
        Ok(())
    }
}
