//! Dependency-tracking log resolution for a compile+link toolchain
//!
//! Every tool invocation leaves a `<tool>[.<pid>].read.<n>.tlog` listing the
//! files it consulted and a matching `write` log listing what it produced.
//! Real inputs are the files read, minus noise and minus what the step's own
//! compile phase wrote. Real outputs come from the link-phase write log plus
//! any intermediate artifact that is consumed outside the step.
//!
//! Logs are first stashed in a [`TrackingLogStash`] keyed by the declared
//! inputs, with the workspace root stripped, so a later check on any agent
//! can locate and replay them.

use super::{CacheKind, DependencyResolver, Resolution};
use crate::config::schema::ResolveConfig;
use crate::error::{MinBuildError, MinBuildResult};
use crate::fileops;
use crate::fileset::{ends_with_any, native_path, normalize_key, normalize_str, starts_with_any, FileSet};
use crate::hash::HashEngine;
use crate::retry::RetryPolicy;
use crate::store::COMPLETE_MARKER;
use crate::text::decode_text;
use filetime::FileTime;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOG_EXT: &str = "tlog";

/// Characters that never appear in a tracked path
const INVALID_PATH_CHARS: &[char] = &['|', '"', '<', '>', '*', '?'];

/// Extensions of intermediate artifacts consumed outside the step
const EXTERNAL_ARTIFACT_EXTS: &[&str] = &["lib", "dll", "exe"];
const DEBUG_SYMBOLS_EXT: &str = "pdb";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDirection {
    Read,
    Write,
}

/// One tracking log file, classified by its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingLog {
    pub path: PathBuf,
    pub tool: String,
    pub direction: LogDirection,
}

impl TrackingLog {
    /// Classify `path`; `None` for files that are not tracking logs
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() < 3 || segments.last() != Some(&LOG_EXT) {
            return None;
        }
        let direction = segments[1..].iter().find_map(|s| match *s {
            "read" => Some(LogDirection::Read),
            "write" => Some(LogDirection::Write),
            _ => None,
        })?;
        Some(Self {
            path: path.to_path_buf(),
            tool: segments[0].to_string(),
            direction,
        })
    }

    fn is_link_tool(&self, config: &ResolveConfig) -> bool {
        config.link_tools.iter().any(|t| t.eq_ignore_ascii_case(&self.tool))
    }

    fn is_link(&self, config: &ResolveConfig) -> bool {
        self.direction == LogDirection::Write && self.is_link_tool(config)
    }

    /// Root lines of a link read log name the objects and libraries being
    /// linked. Elsewhere they repeat the source the tool was run on.
    fn keeps_roots(&self, config: &ResolveConfig) -> bool {
        self.direction == LogDirection::Read && self.is_link_tool(config)
    }

    fn is_assembler(&self, config: &ResolveConfig) -> bool {
        config.assembler_tools.iter().any(|t| t.eq_ignore_ascii_case(&self.tool))
    }
}

/// All tracking logs in `dir`, sorted by file name
pub fn tracking_logs(dir: &Path) -> MinBuildResult<Vec<TrackingLog>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| MinBuildError::io(format!("listing {}", dir.display()), e))?;
    let mut logs: Vec<TrackingLog> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| TrackingLog::parse(&entry.path()))
        .collect();
    logs.sort_by_key(|log| normalize_key(&log.path));
    Ok(logs)
}

/// Parse one log line into its entries.
///
/// Blank lines yield nothing. A `^` root line lists `|`-separated paths; it
/// yields them only when `keep_roots` is set.
pub fn parse_log_line(log: &Path, line: &str, keep_roots: bool) -> MinBuildResult<Vec<String>> {
    let line = line.trim();
    let entries: Vec<&str> = match line.strip_prefix('^') {
        _ if line.is_empty() => return Ok(vec![]),
        Some(_) if !keep_roots => return Ok(vec![]),
        Some(roots) => roots.split('|').map(str::trim).filter(|e| !e.is_empty()).collect(),
        None => vec![line],
    };

    let malformed = |e: &&str| e.chars().any(|c| c.is_control() || INVALID_PATH_CHARS.contains(&c));
    if entries.iter().any(malformed) {
        return Err(MinBuildError::MalformedLogLine {
            log: log.to_path_buf(),
            line: line.to_string(),
        });
    }
    Ok(entries.into_iter().map(str::to_string).collect())
}

/// Whether a log entry is an absolute path, in either host or Windows form
fn is_rooted(entry: &str) -> bool {
    let bytes = entry.as_bytes();
    entry.starts_with(['/', '\\']) || (bytes.len() >= 2 && bytes[1] == b':')
}

fn extension_key(entry: &str) -> String {
    native_path(entry)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Resolves a step from a directory of tracking logs
#[derive(Debug, Clone)]
pub struct CompileLogResolver {
    log_dir: PathBuf,
    root_dir: Option<PathBuf>,
    config: ResolveConfig,
    retry: RetryPolicy,
}

impl CompileLogResolver {
    pub fn new(log_dir: impl Into<PathBuf>, config: ResolveConfig) -> Self {
        Self {
            log_dir: log_dir.into(),
            root_dir: None,
            config,
            retry: RetryPolicy::default(),
        }
    }

    /// Resolve root-relative log entries against `root`
    pub fn with_root_dir(mut self, root: Option<PathBuf>) -> Self {
        self.root_dir = root;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Valid entries of one log, rejecting foreign build sessions
    fn read_entries(&self, log: &TrackingLog) -> MinBuildResult<Vec<String>> {
        let bytes = fileops::read_with_retry(&self.retry, &log.path)?;
        let Some(text) = decode_text(&bytes) else {
            warn!("Skipping undecodable tracking log {}", log.path.display());
            return Ok(vec![]);
        };

        let keep_roots = log.keeps_roots(&self.config);
        let mut entries = Vec::new();
        for line in text.lines() {
            let parsed = match parse_log_line(&log.path, line, keep_roots) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            for entry in parsed {
                if starts_with_any(&normalize_str(&entry), &self.config.agent_prefixes) {
                    return Err(MinBuildError::StaleLogSession {
                        log: log.path.clone(),
                        line: entry,
                    });
                }
                entries.push(entry);
            }
        }
        debug!("Read {} entries from {}", entries.len(), log.path.display());
        Ok(entries)
    }

    fn is_noise(&self, entry: &str) -> bool {
        let key = normalize_str(entry);
        ends_with_any(&key, &self.config.log_noise_extensions)
            || ends_with_any(&key, &self.config.log_temp_extensions)
            || self
                .config
                .log_noise_subpaths
                .iter()
                .any(|sub| !sub.is_empty() && key.contains(&normalize_str(sub)))
    }

    fn locate(&self, entry: &str) -> PathBuf {
        match &self.root_dir {
            Some(root) if !is_rooted(entry) => root.join(native_path(entry)),
            _ => native_path(entry),
        }
    }
}

impl DependencyResolver for CompileLogResolver {
    fn kind(&self) -> CacheKind {
        CacheKind::CompileLog
    }

    fn resolve(&self) -> MinBuildResult<Resolution> {
        let logs = tracking_logs(&self.log_dir)?;
        if !logs.iter().any(|log| log.is_link(&self.config)) {
            return Err(MinBuildError::resolution(format!(
                "no link tracking log in {}",
                self.log_dir.display()
            )));
        }

        let mut candidates = Vec::new();
        let mut intermediate = HashSet::new();
        let mut external = Vec::new();
        let mut final_outputs = Vec::new();

        for log in &logs {
            let entries = self.read_entries(log)?;
            match log.direction {
                LogDirection::Read => {
                    candidates.extend(entries.into_iter().filter(|e| !self.is_noise(e)));
                }
                LogDirection::Write if log.is_link(&self.config) => {
                    final_outputs.extend(
                        entries
                            .into_iter()
                            .filter(|e| !ends_with_any(&normalize_str(e), &self.config.log_temp_extensions)),
                    );
                }
                LogDirection::Write => {
                    for entry in entries {
                        let ext = extension_key(&entry);
                        let consumed_outside = EXTERNAL_ARTIFACT_EXTS.contains(&ext.as_str())
                            || (ext == DEBUG_SYMBOLS_EXT && !log.is_assembler(&self.config));
                        if consumed_outside {
                            debug!("Keeping intermediate output {}", entry);
                            external.push(entry.clone());
                        }
                        intermediate.insert(normalize_str(&entry));
                    }
                }
            }
        }

        let inputs: FileSet = candidates
            .iter()
            .filter(|e| !intermediate.contains(&normalize_str(e)))
            .map(|e| self.locate(e))
            .collect();
        let outputs = FileSet::ordered(
            final_outputs
                .iter()
                .chain(external.iter())
                .map(|e| self.locate(e)),
        );

        info!(
            "Resolved {} inputs and {} outputs from {}",
            inputs.len(),
            outputs.len(),
            self.log_dir.display()
        );
        Resolution::new(inputs, outputs)
    }

    fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }
}

/// Stashed copy of a step's tracking logs, keyed by declared inputs and
/// build configuration
#[derive(Debug, Clone)]
pub struct TrackingLogStash {
    dir: PathBuf,
}

impl TrackingLogStash {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stash for `declared` inputs under `entries_dir`
    pub fn locate(
        engine: &HashEngine,
        entries_dir: &Path,
        declared: &FileSet,
        build_config: &str,
    ) -> MinBuildResult<Self> {
        let key = engine.cache_key(declared, build_config)?;
        debug!("Tracking log stash key {}", key);
        Ok(Self::new(entries_dir.join(key.to_string())))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker(&self) -> PathBuf {
        self.dir.join(COMPLETE_MARKER)
    }

    /// Whether a full set of logs was stashed
    pub fn is_complete(&self) -> bool {
        self.marker().is_file()
    }

    /// Refresh the stash's age for the eviction sweep
    pub fn touch(&self, retry: &RetryPolicy) -> MinBuildResult<()> {
        fileops::touch_with_retry(retry, &self.marker(), FileTime::now())
    }

    /// Resolver replaying the stashed logs
    pub fn resolver(&self, root_dir: Option<PathBuf>, config: ResolveConfig) -> CompileLogResolver {
        CompileLogResolver::new(&self.dir, config).with_root_dir(root_dir)
    }

    /// Copy the tracking logs in `local_dir` into the stash.
    ///
    /// The marker is removed first and written last, so a partially
    /// rewritten stash is never replayed. Returns the number of logs stashed.
    pub fn stash_from(
        &self,
        local_dir: &Path,
        root_dir: Option<&Path>,
        config: &ResolveConfig,
        retry: &RetryPolicy,
    ) -> MinBuildResult<usize> {
        if !local_dir.is_dir() {
            return Err(MinBuildError::uncacheable(format!(
                "tracking log directory {} not found",
                local_dir.display()
            )));
        }
        let logs = tracking_logs(local_dir)?;
        if !logs.iter().any(|log| log.is_link(config)) {
            return Err(MinBuildError::uncacheable(format!(
                "no link tracking log in {}",
                local_dir.display()
            )));
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| MinBuildError::io(format!("creating {}", self.dir.display()), e))?;
        let marker = self.marker();
        if marker.exists() {
            fs::remove_file(&marker)
                .map_err(|e| MinBuildError::from_io(&marker, format!("deleting {}", marker.display()), e))?;
        }

        info!("Stashing {} tracking logs from {} to {}", logs.len(), local_dir.display(), self.dir.display());
        let mut stashed = 0;
        for log in &logs {
            let bytes = fileops::read_with_retry(retry, &log.path)?;
            let Some(text) = decode_text(&bytes) else {
                warn!("Skipping undecodable tracking log {}", log.path.display());
                continue;
            };
            let cleaned: Vec<String> = text
                .lines()
                .map(|line| match root_dir {
                    Some(root) => strip_root(line, root),
                    None => line.to_string(),
                })
                .collect();

            let Some(name) = log.path.file_name() else {
                continue;
            };
            let destination = self.dir.join(name);
            retry.run("writing", &destination, || {
                fs::write(&destination, cleaned.join("\n")).map_err(|e| {
                    MinBuildError::from_io(&destination, format!("writing {}", destination.display()), e)
                })
            })?;
            stashed += 1;
        }

        fs::File::create(&marker)
            .map_err(|e| MinBuildError::from_io(&marker, format!("creating {}", marker.display()), e))?;
        Ok(stashed)
    }
}

/// Remove every occurrence of `root` from `line`, ignoring ASCII case and
/// separator style
pub fn strip_root(line: &str, root: &Path) -> String {
    let mut needle = root.to_string_lossy().replace('\\', "/").to_ascii_lowercase();
    if needle.is_empty() {
        return line.to_string();
    }
    if !needle.ends_with('/') {
        needle.push('/');
    }
    // ASCII-only substitutions keep byte offsets aligned with `line`
    let haystack = line.replace('\\', "/").to_ascii_lowercase();

    let mut result = String::with_capacity(line.len());
    let mut last = 0;
    for (start, matched) in haystack.match_indices(&needle) {
        result.push_str(&line[last..start]);
        last = start + matched.len();
    }
    result.push_str(&line[last..]);
    result
}
