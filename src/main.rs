use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence::cli::{Cli, Command, RunArgs, StatusArgs};
use cadence::clock;
use cadence::config::Config;
use cadence::cycle::{
    CycleEngine, CycleError, FilePersister, NoopPersister, RunReport, SlotAction,
};
use cadence::git::{DryRunBackend, GitSession, VersionControlBackend};
use cadence::status;
use cadence::types::Environment;

/// Process exit codes, one per flow outcome.
mod exit {
    pub const SUCCESS: u8 = 0;
    /// Invalid invocation, including an unparsable custom date.
    pub const INVALID_INVOCATION: u8 = 2;
    /// Config or status file could not be loaded or saved.
    pub const FILE: u8 = 3;
    /// A branch the flow needed does not exist.
    pub const MISSING_BRANCH: u8 = 4;
    /// A critical git operation failed (conflict, rejected push, cancel).
    pub const GIT_FAILED: u8 = 5;
    /// The flow completed but one or more slots failed to sync.
    pub const DEGRADED: u8 = 6;
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run(args) => run(args),
        Command::Status(args) => show_status(args),
    };
    ExitCode::from(code)
}

fn run(args: RunArgs) -> u8 {
    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return exit::FILE;
        }
    };

    let mut store = match status::load(&args.status) {
        Ok(store) => store,
        Err(err) => {
            error!("{err}");
            return exit::FILE;
        }
    };

    let today = match &args.date {
        Some(raw) => match clock::parse_date(raw, &config.date_format) {
            Ok(date) => date,
            Err(err) => {
                error!("{err}");
                return exit::INVALID_INVOCATION;
            }
        },
        None => Local::now().date_naive(),
    };

    let session = GitSession::new(&args.repo, &config.remote_name, config.commit_identity.clone());

    // Dry-run shares the whole decision path; only the mutations and the
    // status flush are replaced with no-ops.
    let result = if args.dry_run {
        let mut backend: Box<dyn VersionControlBackend> = Box::new(DryRunBackend::new(session));
        CycleEngine::new(&config, backend.as_mut()).run(&mut store, today, &mut NoopPersister)
    } else {
        let mut backend: Box<dyn VersionControlBackend> = Box::new(session);
        let mut persister = FilePersister::new(&args.status);
        CycleEngine::new(&config, backend.as_mut()).run(&mut store, today, &mut persister)
    };

    match result {
        Ok(report) => {
            print_report(&report);
            if report.is_degraded() {
                exit::DEGRADED
            } else {
                exit::SUCCESS
            }
        }
        Err(err) => {
            error!("{err}");
            exit_code_for(&err)
        }
    }
}

fn exit_code_for(err: &CycleError) -> u8 {
    match err {
        CycleError::MissingBranch { .. } => exit::MISSING_BRANCH,
        CycleError::GitOperationFailed { .. }
        | CycleError::PromotionConflict { .. }
        | CycleError::Cancelled(_) => exit::GIT_FAILED,
        CycleError::Status(_) => exit::FILE,
        CycleError::Clock(_) => exit::INVALID_INVOCATION,
    }
}

fn print_report(report: &RunReport) {
    match &report.cycle_branch {
        Some(branch) => println!(
            "full cycle at {} (next boundary {}): cut {branch}",
            report.boundary.current, report.boundary.next
        ),
        None => println!(
            "off-cycle day (next boundary {}): touch-up sweep",
            report.boundary.next
        ),
    }
    for slot in &report.sweep {
        let outcome = match &slot.action {
            SlotAction::Unchanged => "unchanged".to_string(),
            SlotAction::Synced => "synced".to_string(),
            SlotAction::Failed { reason } => format!("FAILED: {reason}"),
        };
        println!("  {} -> {}: {}", slot.source, slot.target, outcome);
    }
    for branch in &report.removed_branches {
        println!("  retired {branch}");
    }
}

fn show_status(args: StatusArgs) -> u8 {
    let store = match status::load(&args.status) {
        Ok(store) => store,
        Err(err) => {
            error!("{err}");
            return exit::FILE;
        }
    };

    for env in Environment::ALL {
        match store.target(env) {
            Some(target) => match store.fingerprint(env) {
                Some(commit) => println!("{env:<5} {target}  {commit}"),
                None => println!("{env:<5} {target}"),
            },
            None => println!("{env:<5} (unset)"),
        }
    }
    if let Some(last) = store.last_cycle_date() {
        println!("last cycle:  {last}");
    }
    if let Some(ahead) = store.ahead_cycle_date() {
        println!("next cycle:  {ahead}");
    }
    if !store.tracked_branches().is_empty() {
        println!("tracked branches: {}", store.tracked_branches().len());
    }

    exit::SUCCESS
}
