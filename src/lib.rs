//! MinBuild - incremental-build artifact cache
//!
//! Decides whether a build step's outputs can be restored from a shared
//! cache instead of rebuilding, keyed on the content of the step's true
//! inputs, and stores freshly built outputs for later reuse.

pub mod cli;
pub mod config;
pub mod error;
pub mod fileops;
pub mod fileset;
pub mod hash;
pub mod orchestrator;
pub mod resolve;
pub mod retry;
pub mod staleness;
pub mod store;
pub mod text;

pub use error::{MinBuildError, MinBuildResult};
pub use orchestrator::{CacheOrchestrator, CheckOutcome, CheckStatus, CommitStatus};
pub use resolve::{CacheKind, DependencyResolver};
