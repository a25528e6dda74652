//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cadence",
    version,
    about = "Promote code through environment branches on a fixed release cycle"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the promotion flow for today (or an overridden date).
    Run(RunArgs),
    /// Show the persisted environment targets and cycle ledger.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the JSON config file.
    #[arg(long, default_value = "cadence.json")]
    pub config: PathBuf,

    /// Path to the persisted status file.
    #[arg(long, default_value = "cadence-status.json")]
    pub status: PathBuf,

    /// Repository working directory.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Use this date as "today" (in the configured date format).
    #[arg(long)]
    pub date: Option<String>,

    /// Evaluate every step but skip all repository mutations; the status
    /// file is not written.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Path to the persisted status file.
    #[arg(long, default_value = "cadence-status.json")]
    pub status: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "cadence",
            "run",
            "--config",
            "deploy/cadence.json",
            "--date",
            "2025-09-01",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, PathBuf::from("deploy/cadence.json"));
                assert_eq!(args.date.as_deref(), Some("2025-09-01"));
                assert!(args.dry_run);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["cadence", "rotate"]).is_err());
    }
}
