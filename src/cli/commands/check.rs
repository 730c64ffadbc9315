//! Check command - restore a step's outputs from the cache if possible

use super::{step_config, step_resolver};
use crate::cli::args::{CheckArgs, OutputFormat};
use crate::config::Config;
use crate::error::MinBuildResult;
use crate::orchestrator::{CacheOrchestrator, CheckOutcome, CheckStatus, StepOptions};
use console::style;

/// Execute the check command
pub fn execute(args: CheckArgs, config: &Config) -> MinBuildResult<()> {
    let mut config = step_config(config, &args.step);
    config.cache.always_restore |= args.always_restore;
    let step = &args.step;

    let options = StepOptions::from_config(&step.project, &config.cache);
    let outcome = if let Some(reason) = options.skip_reason() {
        CheckOutcome::new(None, CheckStatus::Skipped(reason))
    } else {
        match step_resolver(&args.resolver, &config, &step.build_config)? {
            Some(resolver) => CacheOrchestrator::new(resolver, &config, &step.project)
                .check_and_restore(&step.build_config)?,
            None => CheckOutcome::new(
                None,
                CheckStatus::Miss("no stashed tracking logs".to_string()),
            ),
        }
    };

    print_outcome(&outcome, args.format)
}

fn print_outcome(outcome: &CheckOutcome, format: OutputFormat) -> MinBuildResult<()> {
    let key = outcome
        .key
        .map(|k| k.to_string())
        .unwrap_or_else(|| "-".to_string());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Plain => {
            println!("key: {}", key);
            println!("status: {}", outcome.status);
        }
        OutputFormat::Table => {
            let label = style(outcome.status.label());
            let status = match &outcome.status {
                _ if outcome.is_hit() => label.green(),
                CheckStatus::Miss(_) => label.yellow(),
                _ => label.dim(),
            };
            println!("{:<8} {}", style("KEY").bold(), key);
            println!("{:<8} {}", style("STATUS").bold(), status);
            match &outcome.status {
                CheckStatus::Restored(paths) => {
                    for path in paths {
                        println!("  {}", path.display());
                    }
                }
                CheckStatus::Miss(reason) | CheckStatus::Skipped(reason) => {
                    println!("  {}", style(reason).dim());
                }
                CheckStatus::UpToDate => {}
            }
        }
    }
    Ok(())
}
