//! CLI argument definitions using clap derive

use crate::resolve::CacheKind;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// MinBuild - incremental-build artifact cache
///
/// Decides whether a build step's outputs can be restored from the cache
/// instead of rebuilding, and stores freshly built outputs for reuse.
#[derive(Parser, Debug)]
#[command(name = "minbuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MINBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root directory, overriding cache.root
    #[arg(long, global = true, env = "MINBUILD_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the cache and restore outputs on a hit
    Check(CheckArgs),

    /// Store freshly built outputs
    Commit(CommitArgs),

    /// Print a step's resolved inputs and outputs
    Resolve(ResolveArgs),

    /// Print the cache key of a list of files
    Hash(HashArgs),

    /// Show a cache entry
    Inspect(InspectArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Settings shared by check and commit
#[derive(Args, Debug, Clone)]
pub struct StepArgs {
    /// Project name, matched against cache.skip_projects
    #[arg(short, long)]
    pub project: String,

    /// Build configuration discriminator (e.g. "Debug|x64")
    #[arg(short, long)]
    pub build_config: String,

    /// Branch recorded with committed entries
    #[arg(long, env = "CURRENT_BRANCH")]
    pub branch: Option<String>,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub step: StepArgs,

    /// Verify hashes even when outputs are newer than inputs
    #[arg(long)]
    pub always_restore: bool,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub resolver: ResolverArgs,
}

/// Arguments for the commit command
#[derive(Parser, Debug)]
pub struct CommitArgs {
    #[command(flatten)]
    pub step: StepArgs,

    /// Key printed by an earlier check; recomputed when omitted
    #[arg(short, long)]
    pub key: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub resolver: ResolverArgs,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Build configuration, needed to locate stashed tracking logs
    #[arg(short, long, default_value = "")]
    pub build_config: String,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub resolver: ResolverArgs,
}

/// How a step's inputs and outputs are found
#[derive(Subcommand, Debug, Clone)]
pub enum ResolverArgs {
    /// Explicit `;`-delimited file lists
    List {
        /// Input files
        #[arg(long)]
        inputs: String,

        /// Output files
        #[arg(long)]
        outputs: String,

        /// Workspace root for the source map
        #[arg(long)]
        root_dir: Option<PathBuf>,
    },

    /// Legacy Makefile plus its #include closure
    Makefile {
        /// Makefile path
        #[arg(long)]
        makefile: PathBuf,

        /// Extra header search directory
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },

    /// Dependency-tracking logs of a compile+link toolchain
    CompileLog {
        /// Declared input files, used to locate the stashed logs
        #[arg(long)]
        inputs: String,

        /// Directory the toolchain writes its tracking logs to
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Workspace root stripped from stashed logs
        #[arg(long)]
        root_dir: Option<PathBuf>,
    },
}

/// Arguments for the hash command
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// Build configuration discriminator
    #[arg(short, long)]
    pub build_config: String,

    /// Print each file's content hash too
    #[arg(long)]
    pub each: bool,

    /// Files to hash
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Cache kind the entry belongs to
    #[arg(long, value_enum)]
    pub kind: CacheKind,

    /// Cache key
    pub key: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Plain,
}
