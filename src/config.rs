//! Runtime configuration for the promotion flows.
//!
//! The config file is JSON with camelCase keys, matching the register of the
//! persisted status file. Everything has a default so a minimal deployment
//! can start from an empty object; validation happens once at load time so
//! the orchestrator never has to re-check invariants mid-flow.

use std::fmt::Write as _;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::CommitIdentity;
use crate::types::Environment;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this schema.
    #[error("malformed config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A field value violates an invariant.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration surface consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Branch developers integrate into; the root of every promotion.
    pub base_branch: String,

    /// User-acceptance-testing environment branch.
    pub uat_branch: String,

    /// Pre-production environment branch.
    pub pre_branch: String,

    /// Production environment branch.
    pub pro_branch: String,

    /// Remote all pushes and deletions go to.
    pub remote_name: String,

    /// Length of a release cycle in days.
    pub cycle_days: u32,

    /// Prefix for date-named branches (e.g. "release/").
    pub branch_prefix: String,

    /// Whether the retention sweeper may delete expired date-branches.
    pub auto_remove_branches: bool,

    /// How many cycles a date-branch is retained before becoming eligible
    /// for deletion.
    pub branch_retention_cycles: u32,

    /// chrono format string for date-branch names and ledger dates.
    pub date_format: String,

    /// Identity for merge and marker commits. When absent, the repository's
    /// own git configuration is used.
    pub commit_identity: Option<CommitIdentity>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_branch: "develop".to_string(),
            uat_branch: "uat".to_string(),
            pre_branch: "pre".to_string(),
            pro_branch: "pro".to_string(),
            remote_name: "origin".to_string(),
            cycle_days: 14,
            branch_prefix: String::new(),
            auto_remove_branches: false,
            branch_retention_cycles: 3,
            date_format: "%Y-%m-%d".to_string(),
            commit_identity: None,
        }
    }
}

impl Config {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// The branch name for an environment role.
    pub fn branch(&self, env: Environment) -> &str {
        match env {
            Environment::Base => &self.base_branch,
            Environment::Uat => &self.uat_branch,
            Environment::Pre => &self.pre_branch,
            Environment::Pro => &self.pro_branch,
        }
    }

    /// All four environment branch names in promotion order.
    pub fn environment_branches(&self) -> [&str; 4] {
        [
            &self.base_branch,
            &self.uat_branch,
            &self.pre_branch,
            &self.pro_branch,
        ]
    }

    /// Checks field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_days < 1 {
            return Err(ConfigError::Invalid("cycleDays must be at least 1".into()));
        }
        if self.branch_retention_cycles < 1 {
            return Err(ConfigError::Invalid(
                "branchRetentionCycles must be at least 1".into(),
            ));
        }
        if self.remote_name.is_empty() {
            return Err(ConfigError::Invalid("remoteName must not be empty".into()));
        }
        for (name, value) in [
            ("baseBranch", &self.base_branch),
            ("uatBranch", &self.uat_branch),
            ("preBranch", &self.pre_branch),
            ("proBranch", &self.pro_branch),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        let branches = self.environment_branches();
        for i in 0..branches.len() {
            for j in (i + 1)..branches.len() {
                if branches[i] == branches[j] {
                    return Err(ConfigError::Invalid(format!(
                        "environment branches must be distinct ({} appears twice)",
                        branches[i]
                    )));
                }
            }
        }
        self.validate_date_format()
    }

    /// Probes the date format with a round trip: an unusable format must be
    /// rejected at load time, not when the first branch name is rendered.
    fn validate_date_format(&self) -> Result<(), ConfigError> {
        let probe = NaiveDate::default();
        let mut rendered = String::new();
        if write!(rendered, "{}", probe.format(&self.date_format)).is_err() {
            return Err(ConfigError::Invalid(format!(
                "dateFormat {:?} is not a valid chrono format",
                self.date_format
            )));
        }
        if NaiveDate::parse_from_str(&rendered, &self.date_format).is_err() {
            return Err(ConfigError::Invalid(format!(
                "dateFormat {:?} does not round-trip a calendar date",
                self.date_format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.base_branch, "develop");
        assert_eq!(config.cycle_days, 14);
        assert_eq!(config.branch_retention_cycles, 3);
        assert!(!config.auto_remove_branches);
    }

    #[test]
    fn camel_case_keys_are_accepted() {
        let config: Config = serde_json::from_str(
            r#"{
                "baseBranch": "develop",
                "proBranch": "production",
                "cycleDays": 7,
                "branchPrefix": "release/",
                "autoRemoveBranches": true,
                "commitIdentity": {"name": "Release Bot", "email": "bot@example.com"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.pro_branch, "production");
        assert_eq!(config.cycle_days, 7);
        assert_eq!(config.branch_prefix, "release/");
        assert!(config.auto_remove_branches);
        assert_eq!(config.commit_identity.unwrap().name, "Release Bot");
    }

    #[test]
    fn zero_cycle_days_is_rejected() {
        let config = Config {
            cycle_days: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn duplicate_environment_branch_is_rejected() {
        let config = Config {
            uat_branch: "develop".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unusable_date_format_is_rejected() {
        let config = Config {
            date_format: "%Q".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn branch_lookup_matches_roles() {
        let config = Config::default();
        assert_eq!(config.branch(Environment::Base), "develop");
        assert_eq!(config.branch(Environment::Pro), "pro");
    }
}
