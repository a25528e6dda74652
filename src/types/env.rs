//! Environment slots and tracked date-branches.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::CommitInfo;

/// One of the four fixed environment roles.
///
/// The ordering of [`Environment::ALL`] is promotion order: code flows from
/// base through UAT and pre-production to production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Base,
    Uat,
    Pre,
    Pro,
}

impl Environment {
    /// All environments in promotion order.
    pub const ALL: [Environment; 4] = [
        Environment::Base,
        Environment::Uat,
        Environment::Pre,
        Environment::Pro,
    ];

    /// The key this environment uses in the persisted status file.
    pub fn key(self) -> &'static str {
        match self {
            Environment::Base => "base",
            Environment::Uat => "uat",
            Environment::Pre => "pre",
            Environment::Pro => "pro",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Environment::Base => 0,
            Environment::Uat => 1,
            Environment::Pre => 2,
            Environment::Pro => 3,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The branch an environment currently tracks, plus the fingerprint of the
/// last commit observed after a successful sync.
///
/// Owned exclusively by the status store; mutated only by the orchestrator
/// after a confirmed backend operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSlot {
    /// Name of the (usually date-named) branch this environment tracks.
    pub target_branch: Option<String>,

    /// Fingerprint observed after the last successful sync of this slot.
    pub last_commit: Option<CommitInfo>,
}

impl EnvironmentSlot {
    /// True when no target has been recorded yet (first run).
    pub fn is_unset(&self) -> bool {
        self.target_branch.is_none()
    }
}

/// A date-named branch created by a full-cycle run, remembered for retention.
///
/// Appended once per cycle; removed only by the retention sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedBranch {
    /// Branch name, including the configured prefix.
    pub branch: String,

    /// Creation time in epoch milliseconds.
    pub time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_promotion_order() {
        let keys: Vec<_> = Environment::ALL.iter().map(|e| e.key()).collect();
        assert_eq!(keys, ["base", "uat", "pre", "pro"]);
    }

    #[test]
    fn indices_are_dense() {
        for (i, env) in Environment::ALL.iter().enumerate() {
            assert_eq!(env.index(), i);
        }
    }

    #[test]
    fn tracked_branch_serde_roundtrip() {
        let tracked = TrackedBranch {
            branch: "release/2025-09-15".to_string(),
            time: 1_736_900_000_000,
        };
        let json = serde_json::to_string(&tracked).unwrap();
        let parsed: TrackedBranch = serde_json::from_str(&json).unwrap();
        assert_eq!(tracked, parsed);
    }
}
