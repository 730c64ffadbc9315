//! Content-addressed artifact store
//!
//! Each cache key owns one flat directory of output files. The entry is
//! valid only once its completion marker exists; the marker is always
//! written last.
//!
//! # Layout
//!
//! ```text
//! <root>/<kind>/[<release>/]<key>/
//!     <output basenames...>
//!     complete
//!     original_branch_name.txt   (optional)
//!     <uuid>.mapped              (optional)
//! <root>/<kind>/Precomputed/<absolute path>/<hash>.hash
//! ```
//!
//! # Concurrency
//!
//! Committers race only on directory creation. The first to create the
//! entry populates it; the rest see it exists and leave it alone. Touching
//! mtimes is the only shared mutation and is safe to race.

pub mod entry;
pub mod source_map;

pub use entry::{format_bytes, EntryInfo};
pub use source_map::{SourceMap, SOURCE_MAP_EXT};

use crate::config::schema::CacheConfig;
use crate::error::{MinBuildError, MinBuildResult};
use crate::fileops;
use crate::fileset::{basename_key, FileSet};
use crate::hash::CacheKey;
use crate::resolve::CacheKind;
use crate::retry::RetryPolicy;
use filetime::FileTime;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Zero-byte file whose presence marks a fully populated entry
pub const COMPLETE_MARKER: &str = "complete";

/// Branch the entry was first committed from
pub const BRANCH_FILE: &str = "original_branch_name.txt";

/// Directory holding precomputed hash records for a cache kind
pub const PRECOMPUTED_DIR: &str = "Precomputed";

/// Where each cache kind lives under the cache root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
    release: Option<String>,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>, release: Option<String>) -> Self {
        Self {
            root: root.into(),
            release: release.filter(|r| !r.trim().is_empty()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(&config.root, config.release.clone())
    }

    /// Directory holding the entries of `kind`
    pub fn entries_dir(&self, kind: CacheKind) -> PathBuf {
        let dir = self.root.join(kind.dir_name());
        match &self.release {
            Some(release) => dir.join(release),
            None => dir,
        }
    }

    /// Precomputed hash records are shared across releases
    pub fn precomputed_dir(&self, kind: CacheKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(PRECOMPUTED_DIR)
    }
}

/// Why a restore did not happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No entry directory for the key
    NotCached,
    /// Entry exists but its completion marker does not
    Incomplete,
    /// Entry lacks a requested output
    MissingFile(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCached => write!(f, "not cached"),
            Self::Incomplete => write!(f, "entry is incomplete"),
            Self::MissingFile(name) => write!(f, "entry has no {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Hit { restored: Vec<PathBuf> },
    Miss(MissReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { entry: PathBuf, files: usize },
    /// Another committer got there first
    AlreadyPresent(PathBuf),
}

/// Commit and restore for one cache kind's entries directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    retry: RetryPolicy,
    uncacheable: Vec<String>,
    branch_name: Option<String>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            dir: dir.into(),
            retry,
            uncacheable: vec![],
            branch_name: None,
        }
    }

    /// Output filename fragments that disable caching
    pub fn with_uncacheable(mut self, patterns: Vec<String>) -> Self {
        self.uncacheable = patterns;
        self
    }

    /// Branch recorded in new entries
    pub fn with_branch_name(mut self, branch: Option<String>) -> Self {
        self.branch_name = branch.filter(|b| !b.trim().is_empty());
        self
    }

    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.to_string())
    }

    /// Entries are flat, so two outputs sharing a basename cannot be stored
    pub fn check_cacheable(&self, outputs: &FileSet) -> MinBuildResult<()> {
        if let Some(duplicate) = outputs.duplicate_basenames().first() {
            return Err(MinBuildError::uncacheable(format!(
                "duplicate output basename {}",
                duplicate.display()
            )));
        }
        for output in outputs {
            let name = basename_key(output);
            if let Some(pattern) = self
                .uncacheable
                .iter()
                .find(|p| !p.is_empty() && name.contains(&p.to_lowercase()))
            {
                return Err(MinBuildError::uncacheable(format!(
                    "{} matches denylisted pattern {:?}",
                    output.display(),
                    pattern
                )));
            }
        }
        Ok(())
    }

    /// Store `outputs` under `key`; first committer wins
    pub fn commit(
        &self,
        key: &CacheKey,
        outputs: &FileSet,
        source_map: Option<&SourceMap>,
    ) -> MinBuildResult<CommitOutcome> {
        self.check_cacheable(outputs)?;
        if let Some(missing) = outputs.iter().find(|p| !p.is_file()) {
            return Err(MinBuildError::uncacheable(format!(
                "output {} was not produced",
                missing.display()
            )));
        }

        let entry = self.entry_dir(key);
        if entry.exists() {
            info!("{} already cached, not overwriting", entry.display());
            self.touch_entry(&entry);
            return Ok(CommitOutcome::AlreadyPresent(entry));
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| MinBuildError::io(format!("creating {}", self.dir.display()), e))?;
        match fs::create_dir(&entry) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!("{} created concurrently, not overwriting", entry.display());
                return Ok(CommitOutcome::AlreadyPresent(entry));
            }
            Err(e) => {
                return Err(MinBuildError::io(format!("creating {}", entry.display()), e));
            }
        }

        match self.populate(&entry, outputs, source_map) {
            Ok(files) => {
                info!("Cached {} files in {}", files, entry.display());
                Ok(CommitOutcome::Committed { entry, files })
            }
            Err(e) => {
                warn!("Removing partial entry {}: {}", entry.display(), e);
                if let Err(cleanup) = fs::remove_dir_all(&entry) {
                    warn!("Cannot remove {}: {}", entry.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    fn populate(
        &self,
        entry: &Path,
        outputs: &FileSet,
        source_map: Option<&SourceMap>,
    ) -> MinBuildResult<usize> {
        let mut files = 0;
        for output in outputs {
            let Some(name) = output.file_name() else {
                continue;
            };
            debug!("Caching {}", output.display());
            fileops::copy_with_retry(&self.retry, output, &entry.join(name))?;
            files += 1;
        }

        if let Some(branch) = &self.branch_name {
            let path = entry.join(BRANCH_FILE);
            fs::write(&path, branch)
                .map_err(|e| MinBuildError::from_io(&path, format!("writing {}", path.display()), e))?;
        }

        if let Some(map) = source_map {
            let path = entry.join(SourceMap::file_name());
            fs::write(&path, map.render())
                .map_err(|e| MinBuildError::from_io(&path, format!("writing {}", path.display()), e))?;
        }

        let marker = entry.join(COMPLETE_MARKER);
        fs::File::create(&marker)
            .map_err(|e| MinBuildError::from_io(&marker, format!("creating {}", marker.display()), e))?;
        Ok(files)
    }

    /// Restore every output from `key`'s entry, or none of them
    pub fn try_restore(&self, key: &CacheKey, outputs: &FileSet) -> MinBuildResult<RestoreOutcome> {
        self.check_cacheable(outputs)?;

        let entry = self.entry_dir(key);
        if !entry.is_dir() {
            debug!("{} not found", entry.display());
            return Ok(RestoreOutcome::Miss(MissReason::NotCached));
        }
        if !entry.join(COMPLETE_MARKER).is_file() {
            debug!("{} has no completion marker", entry.display());
            return Ok(RestoreOutcome::Miss(MissReason::Incomplete));
        }

        let mut sources = Vec::with_capacity(outputs.len());
        for output in outputs {
            let name = output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let cached = entry.join(&name);
            if !cached.is_file() {
                info!("{} missing from cache entry {}", name, entry.display());
                return Ok(RestoreOutcome::Miss(MissReason::MissingFile(name)));
            }
            sources.push((cached, output));
        }

        let now = FileTime::now();
        let mut restored = Vec::with_capacity(sources.len());
        for (cached, output) in sources {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| MinBuildError::io(format!("creating {}", parent.display()), e))?;
            }
            debug!("Restoring {} to {}", cached.display(), output.display());
            fileops::copy_with_retry(&self.retry, &cached, output)?;
            fileops::touch_with_retry(&self.retry, output, now)?;
            restored.push(output.to_path_buf());
        }
        fileops::touch_with_retry(&self.retry, &entry, now)?;

        self.restore_source_maps(&entry, outputs)?;
        log_branch(&entry);

        info!("Restored {} files from {}", restored.len(), entry.display());
        Ok(RestoreOutcome::Hit { restored })
    }

    fn restore_source_maps(&self, entry: &Path, outputs: &FileSet) -> MinBuildResult<()> {
        let Some(out_dir) = outputs.primary().and_then(Path::parent) else {
            return Ok(());
        };
        let Ok(files) = fs::read_dir(entry) else {
            return Ok(());
        };
        for map in files
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == SOURCE_MAP_EXT))
        {
            if let Some(name) = map.file_name() {
                fileops::copy_with_retry(&self.retry, &map, &out_dir.join(name))?;
            }
        }
        Ok(())
    }

    /// Refresh the entry's age for the eviction sweep; failures only log
    fn touch_entry(&self, entry: &Path) {
        if let Err(e) = fileops::touch_with_retry(&self.retry, entry, FileTime::now()) {
            warn!("Cannot touch {}: {}", entry.display(), e);
        }
    }
}

fn log_branch(entry: &Path) {
    let path = entry.join(BRANCH_FILE);
    match fs::read_to_string(&path) {
        Ok(branch) => info!("Original branch: {}", branch.trim()),
        Err(_) => debug!("Original branch name not found at {}", path.display()),
    }
}
