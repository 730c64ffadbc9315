//! Configuration schema for MinBuild
//!
//! Configuration is stored at `~/.config/minbuild/config.toml`. Every table
//! is optional; missing keys keep their defaults.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache location and behaviour
    pub cache: CacheConfig,

    /// Content hashing
    pub hash: HashConfig,

    /// Dependency resolution filters
    pub resolve: ResolveConfig,

    /// Retry budget for locked files
    pub retry: RetryConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory shared by all build steps
    pub root: PathBuf,

    /// Release line; entries from any branch of the same release are reused
    pub release: Option<String>,

    /// Verify hashes even when outputs are trivially up to date
    pub always_restore: bool,

    /// Log every per-file content hash at info level
    pub show_content_hashes: bool,

    /// Log why a step is being recompiled at info level
    pub show_recompile_reason: bool,

    /// `#`-delimited project name fragments that never use the cache
    pub skip_projects: String,

    /// Output filename fragments that make a step uncacheable
    pub uncacheable_outputs: Vec<String>,

    /// Create empty placeholders for missing inputs instead of failing
    pub create_missing_inputs: bool,

    /// Branch recorded alongside committed entries
    pub branch_name: Option<String>,
}

impl CacheConfig {
    /// Default cache root under the user cache directory
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("minbuild")
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            release: None,
            always_restore: false,
            show_content_hashes: false,
            show_recompile_reason: false,
            skip_projects: String::new(),
            uncacheable_outputs: vec![],
            create_missing_inputs: false,
            branch_name: None,
        }
    }
}

/// Content hashing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    /// Roots whose files never change between toolchain installs; their
    /// hashes are memoized on disk
    pub immutable_roots: Vec<String>,

    /// Filename suffixes of text files that carry version stamps
    pub version_stamp_files: Vec<String>,

    /// Lines containing any of these markers are ignored when hashing a
    /// version-stamp file
    pub version_keywords: Vec<String>,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            immutable_roots: vec![
                "c:/program files".to_string(),
                "/usr/include/".to_string(),
                "/opt/".to_string(),
            ],
            version_stamp_files: vec![
                "assemblyinfo.cs".to_string(),
                ".rc".to_string(),
                ".rc2".to_string(),
            ],
            version_keywords: vec![
                "AssemblyVersion".to_string(),
                "AssemblyFileVersion".to_string(),
                "AssemblyInformationalVersion".to_string(),
                "FILEVERSION".to_string(),
                "PRODUCTVERSION".to_string(),
                "\"FileVersion\"".to_string(),
                "\"ProductVersion\"".to_string(),
            ],
        }
    }
}

/// Dependency resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// System and toolchain install roots excluded from input sets
    pub system_roots: Vec<String>,

    /// Generated or noise filename suffixes excluded from input sets
    pub noise_suffixes: Vec<String>,

    /// Suffix of the randomly named temporary project file
    pub temp_project_suffix: String,

    /// Extra header search directories for Makefile projects
    pub include_paths: Vec<PathBuf>,

    /// Absolute path prefixes local to a build agent; a dependency log that
    /// still mentions one belongs to another session
    pub agent_prefixes: Vec<String>,

    /// Intermediate artifact extensions dropped from log-derived inputs
    pub log_noise_extensions: Vec<String>,

    /// Temp and log-format extensions dropped from log-derived inputs and outputs
    pub log_temp_extensions: Vec<String>,

    /// Non-deterministic system or user-profile subpaths dropped from
    /// log-derived inputs
    pub log_noise_subpaths: Vec<String>,

    /// Tool names whose write log holds the final link outputs
    pub link_tools: Vec<String>,

    /// Assembler tool names; their debug symbols are not final outputs
    pub assembler_tools: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            system_roots: strings(&["c:/windows", "c:/program files"]),
            noise_suffixes: strings(&["assemblyattributes.cs", "assemblyinfo.cs", ".rc"]),
            temp_project_suffix: ".tmp_proj".to_string(),
            include_paths: vec![],
            agent_prefixes: strings(&["c:/buildagent/", "d:/buildagent/"]),
            log_noise_extensions: strings(&[
                ".obj", ".pch", ".idb", ".ilk", ".res", ".ipch", ".assemblyattributes.cpp",
            ]),
            log_temp_extensions: strings(&[".tmp", ".tlog", ".log", ".rsp", ".lastbuildstate"]),
            log_noise_subpaths: strings(&["/appdata/", "/temp/", "/windows/"]),
            link_tools: strings(&["link", "lib", "ilink", "lib-link"]),
            assembler_tools: strings(&["ml", "ml64", "masm", "armasm"]),
        }
    }
}

/// Retry configuration for locked or briefly inaccessible files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before giving up on a locked file, including the first
    pub max_attempts: u32,

    /// Attempts before giving up on access-denied and other transient
    /// errors that are not lock contention
    pub max_denied_attempts: u32,

    /// First backoff delay in milliseconds
    pub initial_delay_ms: u64,

    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,

    /// Wall-clock budget in seconds
    pub max_elapsed_secs: u64,
}

impl RetryConfig {
    /// Build the runtime policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            max_denied_attempts: self.max_denied_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_elapsed: Duration::from_secs(self.max_elapsed_secs),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            max_denied_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            max_elapsed_secs: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[resolve]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.resolve.temp_project_suffix, ".tmp_proj");
        assert!(!config.cache.always_restore);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            root = "/var/cache/minbuild"
            release = "7.2"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.root, PathBuf::from("/var/cache/minbuild"));
        assert_eq!(config.cache.release.as_deref(), Some("7.2"));
        assert_eq!(config.retry.max_attempts, 30); // default preserved
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = RetryConfig {
            max_attempts: 0,
            initial_delay_ms: 10,
            max_delay_ms: 40,
            max_elapsed_secs: 2,
            ..Default::default()
        }
        .policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_for(5), Duration::from_millis(40));
    }
}
