//! Commit command - store a freshly built step's outputs

use super::{locate_stash, step_config, step_resolver};
use crate::cli::args::{CommitArgs, OutputFormat, ResolverArgs};
use crate::config::Config;
use crate::error::MinBuildResult;
use crate::hash::CacheKey;
use crate::orchestrator::{CacheOrchestrator, CommitStatus, StepOptions};
use console::style;
use tracing::info;

/// Execute the commit command
pub fn execute(args: CommitArgs, config: &Config) -> MinBuildResult<()> {
    let config = step_config(config, &args.step);
    let step = &args.step;
    let key: Option<CacheKey> = args.key.as_deref().map(str::parse).transpose()?;

    let options = StepOptions::from_config(&step.project, &config.cache);
    let status = if let Some(reason) = options.skip_reason() {
        CommitStatus::Skipped(reason)
    } else if let Some(reason) = stash_tracking_logs(&args.resolver, &config, &step.build_config)? {
        CommitStatus::Skipped(reason)
    } else {
        match step_resolver(&args.resolver, &config, &step.build_config)? {
            Some(resolver) => CacheOrchestrator::new(resolver, &config, &step.project)
                .commit_resolved(&step.build_config, key)?,
            None => CommitStatus::Skipped("no stashed tracking logs".to_string()),
        }
    };

    print_status(&status, args.format)
}

/// Copy freshly written tracking logs into their stash; returns a skip
/// reason when there is nothing usable to stash
fn stash_tracking_logs(
    resolver: &ResolverArgs,
    config: &Config,
    build_config: &str,
) -> MinBuildResult<Option<String>> {
    let ResolverArgs::CompileLog {
        inputs,
        log_dir: Some(log_dir),
        root_dir,
    } = resolver
    else {
        return Ok(None);
    };

    let stash = locate_stash(config, inputs, build_config)?;
    let stashed = stash.stash_from(
        log_dir,
        root_dir.as_deref(),
        &config.resolve,
        &config.retry.policy(),
    );
    match stashed {
        Ok(count) => {
            info!("Stashed {} tracking logs", count);
            Ok(None)
        }
        Err(e) if !e.is_fatal() => {
            info!("Caching disabled: {}", e);
            Ok(Some(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

fn print_status(status: &CommitStatus, format: OutputFormat) -> MinBuildResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(status)?),
        OutputFormat::Plain => match status {
            CommitStatus::Committed { entry, .. } => {
                println!("status: committed");
                println!("entry: {}", entry.display());
            }
            CommitStatus::AlreadyPresent(entry) => {
                println!("status: already-present");
                println!("entry: {}", entry.display());
            }
            CommitStatus::Skipped(reason) => {
                println!("status: skipped");
                println!("reason: {}", reason);
            }
        },
        OutputFormat::Table => match status {
            CommitStatus::Committed { entry, files } => println!(
                "{} {} files in {}",
                style("Committed").green().bold(),
                files,
                entry.display()
            ),
            CommitStatus::AlreadyPresent(entry) => println!(
                "{} {}",
                style("Already cached").green(),
                entry.display()
            ),
            CommitStatus::Skipped(reason) => {
                println!("{} {}", style("Skipped").yellow(), style(reason).dim())
            }
        },
    }
    Ok(())
}
