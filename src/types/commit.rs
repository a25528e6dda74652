//! Commit fingerprints for change detection.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Sha;

/// The last-observed commit of a tracked ref.
///
/// This is the change-detection fingerprint: before re-syncing a slot, the
/// orchestrator compares the source ref's current head hash against the
/// recorded fingerprint and skips the sync when they match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full commit hash.
    pub hash: Sha,

    /// Committer date as reported by the backend (ISO 8601).
    pub date: String,

    /// Subject line of the commit message.
    pub message: String,

    /// Author name.
    pub author: String,
}

impl CommitInfo {
    /// True when this fingerprint refers to the given commit.
    ///
    /// Only the hash participates in the comparison; date/message/author are
    /// carried for display and diagnostics.
    pub fn matches(&self, hash: &Sha) -> bool {
        self.hash == *hash
    }
}

impl fmt::Display for CommitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hash.short(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(hash: &str) -> CommitInfo {
        CommitInfo {
            hash: Sha::new(hash.repeat(40)),
            date: "2025-09-01T10:00:00+00:00".to_string(),
            message: "promote".to_string(),
            author: "release-bot".to_string(),
        }
    }

    #[test]
    fn matches_compares_hash_only() {
        let a = info("a");
        let mut other = info("a");
        other.message = "different subject".to_string();
        assert!(a.matches(&other.hash));
        assert!(!a.matches(&info("b").hash));
    }

    #[test]
    fn serde_roundtrip() {
        let a = info("c");
        let json = serde_json::to_string(&a).unwrap();
        let parsed: CommitInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(a, parsed);
    }
}
