//! Hash command - print the cache key of a file list

use crate::cli::args::HashArgs;
use crate::config::Config;
use crate::error::MinBuildResult;
use crate::fileset::FileSet;
use crate::hash::HashEngine;

/// Execute the hash command
pub fn execute(args: HashArgs, config: &Config) -> MinBuildResult<()> {
    let files = FileSet::canonical(args.files);
    let engine = HashEngine::new(config.hash.clone(), config.retry.policy());

    if args.each {
        for path in &files {
            println!("{}  {}", engine.hash_file(path)?, path.display());
        }
    }
    println!("{}", engine.cache_key(&files, &args.build_config)?);
    Ok(())
}
