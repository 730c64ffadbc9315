//! Resolve command - print what a step would be keyed on

use super::step_resolver;
use crate::cli::args::{OutputFormat, ResolveArgs, ResolverArgs};
use crate::config::Config;
use crate::error::MinBuildResult;
use crate::resolve::{CompileLogResolver, DependencyResolver, Resolution};
use console::style;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ResolvedStep {
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
}

/// Execute the resolve command
pub fn execute(args: ResolveArgs, config: &Config) -> MinBuildResult<()> {
    // A local log directory is replayed directly, without going through the stash
    let resolver: Option<Box<dyn DependencyResolver>> = match &args.resolver {
        ResolverArgs::CompileLog {
            log_dir: Some(log_dir),
            root_dir,
            ..
        } => Some(Box::new(
            CompileLogResolver::new(log_dir, config.resolve.clone())
                .with_root_dir(root_dir.clone())
                .with_retry(config.retry.policy()),
        )),
        other => step_resolver(other, config, &args.build_config)?,
    };

    let Some(resolver) = resolver else {
        eprintln!("{} no stashed tracking logs", style("!").yellow().bold());
        return Ok(());
    };

    print_resolution(resolver.resolve()?, args.format)
}

fn print_resolution(resolution: Resolution, format: OutputFormat) -> MinBuildResult<()> {
    let step = ResolvedStep {
        inputs: resolution.inputs.into_vec(),
        outputs: resolution.outputs.into_vec(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&step)?),
        OutputFormat::Plain => {
            for input in &step.inputs {
                println!("INP:{}", input.display());
            }
            for output in &step.outputs {
                println!("OUT:{}", output.display());
            }
        }
        OutputFormat::Table => {
            println!("{} ({})", style("INPUTS").bold(), step.inputs.len());
            for input in &step.inputs {
                println!("  {}", input.display());
            }
            println!("{} ({})", style("OUTPUTS").bold(), step.outputs.len());
            for output in &step.outputs {
                println!("  {}", output.display());
            }
        }
    }
    Ok(())
}
