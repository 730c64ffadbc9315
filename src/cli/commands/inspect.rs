//! Inspect command - show one cache entry

use crate::cli::args::{InspectArgs, OutputFormat};
use crate::config::Config;
use crate::error::{MinBuildError, MinBuildResult};
use crate::hash::CacheKey;
use crate::store::{format_bytes, CacheLayout, EntryInfo};
use console::style;

/// Execute the inspect command
pub fn execute(args: InspectArgs, config: &Config) -> MinBuildResult<()> {
    let key: CacheKey = args.key.parse()?;
    let path = CacheLayout::from_config(&config.cache)
        .entries_dir(args.kind)
        .join(key.to_string());

    if !path.is_dir() {
        return Err(MinBuildError::InvalidCacheKey {
            key: key.to_string(),
            reason: format!("no {} entry at {}", args.kind, path.display()),
        });
    }
    let info = EntryInfo::load(&path)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Plain => {
            println!("path: {}", info.path.display());
            println!("complete: {}", info.complete);
            println!("branch: {}", info.branch.as_deref().unwrap_or("-"));
            for file in &info.files {
                println!("file: {} {}", file.name, file.size_bytes);
            }
        }
        OutputFormat::Table => print_table(&info),
    }
    Ok(())
}

fn print_table(info: &EntryInfo) {
    let complete = if info.complete {
        style("complete").green()
    } else {
        style("incomplete").red()
    };
    let age = info
        .age_days()
        .map(|days| format!("{} days ago", days))
        .unwrap_or_else(|| "unknown".to_string());

    println!("{}", style(info.path.display()).bold());
    println!("  {:<12} {}", "state", complete);
    println!("  {:<12} {}", "branch", info.branch.as_deref().unwrap_or("-"));
    println!("  {:<12} {}", "last used", age);
    println!("  {:<12} {}", "source maps", info.source_maps);
    println!();
    println!("  {:<40} {:>10}", style("FILE").bold(), style("SIZE").bold());
    for file in &info.files {
        println!("  {:<40} {:>10}", file.name, format_bytes(file.size_bytes));
    }
    println!(
        "  {:<40} {:>10}",
        style("total").dim(),
        format_bytes(info.total_bytes())
    );
}
