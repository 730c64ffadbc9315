//! CLI command implementations

pub mod check;
pub mod commit;
pub mod config;
pub mod hash;
pub mod inspect;
pub mod resolve;

pub use check::execute as check;
pub use commit::execute as commit;
pub use config::execute as config;
pub use hash::execute as hash;
pub use inspect::execute as inspect;
pub use resolve::execute as resolve;

use crate::cli::args::{ResolverArgs, StepArgs};
use crate::config::Config;
use crate::error::MinBuildResult;
use crate::fileops;
use crate::fileset::FileSet;
use crate::hash::HashEngine;
use crate::resolve::list::split_file_list;
use crate::resolve::{CacheKind, DependencyResolver, ListResolver, MakefileResolver, TrackingLogStash};
use crate::store::CacheLayout;
use tracing::{debug, info, warn};

/// Configuration with the step's command-line overrides applied
fn step_config(config: &Config, step: &StepArgs) -> Config {
    let mut config = config.clone();
    if step.branch.is_some() {
        config.cache.branch_name = step.branch.clone();
    }
    config
}

/// Resolver for a step, or `None` when its tracking logs were never stashed
fn step_resolver(
    args: &ResolverArgs,
    config: &Config,
    build_config: &str,
) -> MinBuildResult<Option<Box<dyn DependencyResolver>>> {
    let resolver: Box<dyn DependencyResolver> = match args {
        ResolverArgs::List {
            inputs,
            outputs,
            root_dir,
        } => Box::new(
            ListResolver::new(inputs.as_str(), outputs.as_str(), config.resolve.clone())
                .with_root_dir(root_dir.clone()),
        ),
        ResolverArgs::Makefile { makefile, include } => {
            let mut resolve = config.resolve.clone();
            resolve.include_paths.extend(include.iter().cloned());
            Box::new(MakefileResolver::new(makefile, resolve))
        }
        ResolverArgs::CompileLog { inputs, root_dir, .. } => {
            let stash = locate_stash(config, inputs, build_config)?;
            if !stash.is_complete() {
                info!("No stashed tracking logs in {}", stash.dir().display());
                return Ok(None);
            }
            let retry = config.retry.policy();
            if let Err(e) = stash.touch(&retry) {
                warn!("Cannot refresh {}: {}", stash.dir().display(), e);
            }
            Box::new(
                stash
                    .resolver(root_dir.clone(), config.resolve.clone())
                    .with_retry(retry),
            )
        }
    };
    Ok(Some(resolver))
}

/// Stash holding the tracking logs for `declared` inputs under `build_config`
fn locate_stash(config: &Config, declared: &str, build_config: &str) -> MinBuildResult<TrackingLogStash> {
    let declared = FileSet::canonical(split_file_list(declared));
    fileops::ensure_inputs(&declared, config.cache.create_missing_inputs)?;

    let layout = CacheLayout::from_config(&config.cache);
    let engine = HashEngine::new(config.hash.clone(), config.retry.policy());
    let stash = TrackingLogStash::locate(
        &engine,
        &layout.entries_dir(CacheKind::CompileLog),
        &declared,
        build_config,
    )?;
    debug!("Tracking log stash at {}", stash.dir().display());
    Ok(stash)
}
