//! MinBuild - incremental-build artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use minbuild::cli::{Cli, Commands};
use minbuild::config::{Config, ConfigManager};
use minbuild::error::MinBuildResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> MinBuildResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load()?;
    if let Some(root) = cli.cache_root.clone() {
        config.cache.root = root;
    }

    init_logging(cli.verbose, &config);
    debug!("Cache root {}", config.cache.root.display());

    match cli.command {
        Commands::Check(args) => minbuild::cli::commands::check(args, &config),
        Commands::Commit(args) => minbuild::cli::commands::commit(args, &config),
        Commands::Resolve(args) => minbuild::cli::commands::resolve(args, &config),
        Commands::Hash(args) => minbuild::cli::commands::hash(args, &config),
        Commands::Inspect(args) => minbuild::cli::commands::inspect(args, &config),
        Commands::Config(args) => minbuild::cli::commands::config(args, &config, &config_manager),
    }
}

/// 0 = warn, 1 = info, 2+ = debug. Logs go to stderr so stdout stays parseable.
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("minbuild=warn"),
        1 => EnvFilter::new("minbuild=info"),
        _ => EnvFilter::new("minbuild=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
