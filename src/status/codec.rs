//! On-disk codec for the status store.
//!
//! Two accepted shapes:
//!
//! ```text
//! { "base": "2025-09-15", ... }                          // legacy flat
//! { "base": {"branch": "2025-09-15", "commit": {...}} }  // rich
//! ```
//!
//! Load normalizes either shape into the in-memory model and remembers which
//! one it saw; save reproduces that shape. Saving the flat shape drops commit
//! fingerprints (the legacy schema has no field for them) deterministically,
//! not as an accident of serialization.
//!
//! Saves are atomic: write to a temp file, fsync it, rename over the target,
//! fsync the directory. Readers always see either the old or the new status,
//! never a partial write.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{StatusShape, StatusStore};
use crate::types::{CommitInfo, Environment, EnvironmentSlot, TrackedBranch};

/// Errors from loading or saving the status file.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The status file could not be read or written.
    #[error("status file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The status file is not valid JSON for either accepted shape.
    #[error("malformed status file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One slot as it appears on disk: either a bare branch name (legacy) or an
/// object carrying the fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SlotRepr {
    Flat(String),
    Rich {
        branch: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        commit: Option<CommitInfo>,
    },
}

impl SlotRepr {
    fn is_flat(&self) -> bool {
        matches!(self, SlotRepr::Flat(_))
    }

    fn into_slot(self) -> EnvironmentSlot {
        match self {
            SlotRepr::Flat(branch) => EnvironmentSlot {
                target_branch: Some(branch),
                last_commit: None,
            },
            SlotRepr::Rich { branch, commit } => EnvironmentSlot {
                target_branch: branch,
                last_commit: commit,
            },
        }
    }
}

/// Top-level file structure, shared by both shapes.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<SlotRepr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uat: Option<SlotRepr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre: Option<SlotRepr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pro: Option<SlotRepr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_cycle_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ahead_cycle_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    branches: Vec<TrackedBranch>,
}

impl StatusFile {
    fn slot(&self, env: Environment) -> &Option<SlotRepr> {
        match env {
            Environment::Base => &self.base,
            Environment::Uat => &self.uat,
            Environment::Pre => &self.pre,
            Environment::Pro => &self.pro,
        }
    }

    fn slot_mut(&mut self, env: Environment) -> &mut Option<SlotRepr> {
        match env {
            Environment::Base => &mut self.base,
            Environment::Uat => &mut self.uat,
            Environment::Pre => &mut self.pre,
            Environment::Pro => &mut self.pro,
        }
    }

    /// Flat only when at least one slot is present and none is rich.
    fn shape(&self) -> StatusShape {
        let slots = Environment::ALL.map(|env| self.slot(env).as_ref());
        let any_present = slots.iter().any(Option::is_some);
        let all_flat = slots.iter().flatten().all(|repr| repr.is_flat());
        if any_present && all_flat {
            StatusShape::Flat
        } else {
            StatusShape::Rich
        }
    }
}

/// Loads the status file, normalizing either on-disk shape.
///
/// A missing file is a first run and yields an empty store, not an error.
pub fn load(path: &Path) -> Result<StatusStore, StatusError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StatusStore::empty()),
        Err(source) => {
            return Err(StatusError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };

    let mut file: StatusFile =
        serde_json::from_slice(&bytes).map_err(|source| StatusError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    let shape = file.shape();
    let slots = Environment::ALL.map(|env| {
        file.slot_mut(env)
            .take()
            .map(SlotRepr::into_slot)
            .unwrap_or_default()
    });

    Ok(StatusStore::restore(
        slots,
        file.last_cycle_date,
        file.ahead_cycle_date,
        file.branches,
        shape,
    ))
}

/// Saves the store, reproducing the shape it was loaded with.
pub fn save(path: &Path, store: &StatusStore) -> Result<(), StatusError> {
    let mut file = StatusFile {
        last_cycle_date: store.last_cycle_date().map(String::from),
        ahead_cycle_date: store.ahead_cycle_date().map(String::from),
        branches: store.tracked_branches().to_vec(),
        ..StatusFile::default()
    };

    for env in Environment::ALL {
        let slot = store.slot(env);
        let repr = match (store.shape(), &slot.target_branch) {
            // Legacy files have no field for commit info; it is dropped.
            (StatusShape::Flat, Some(branch)) => Some(SlotRepr::Flat(branch.clone())),
            (StatusShape::Flat, None) => None,
            (StatusShape::Rich, branch) => Some(SlotRepr::Rich {
                branch: branch.clone(),
                commit: slot.last_commit.clone(),
            }),
        };
        *file.slot_mut(env) = repr;
    }

    let bytes = serde_json::to_vec_pretty(&file).map_err(|source| StatusError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    write_atomic(path, &bytes).map_err(|source| StatusError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write-to-temp-then-rename, with file and directory fsync, so a crash
/// mid-save cannot leave a torn status file.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        // Directory fsync: without it the rename may not survive power loss.
        OpenOptions::new().read(true).open(parent)?.sync_all()?;
    }

    Ok(())
}
