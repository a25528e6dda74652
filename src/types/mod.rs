//! Core domain types shared across the crate.

mod commit;
mod env;
mod ids;

pub use commit::CommitInfo;
pub use env::{Environment, EnvironmentSlot, TrackedBranch};
pub use ids::Sha;
