//! On-disk memo of content hashes for immutable toolchain files
//!
//! A record is an empty `<hash>.hash` file under a directory mirroring the
//! source file's absolute path. The record's own mtime is set to the source
//! file's mtime; any mismatch means the source changed and the hash is
//! recomputed. Concurrent writers race harmlessly: every winner writes the
//! same information, and write failures only cost a recomputation next time.

use super::ContentHash;
use crate::error::MinBuildResult;
use crate::fileops;
use crate::retry::RetryPolicy;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_EXT: &str = "hash";

/// Memoized hashes rooted at a `Precomputed` directory
#[derive(Debug, Clone)]
pub struct PrecomputedHashes {
    root: PathBuf,
}

impl PrecomputedHashes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the record for `path`
    pub fn record_dir(&self, path: &Path) -> PathBuf {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let flattened = absolute.to_string_lossy().replace(':', "");
        flattened
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |dir, part| dir.join(part))
    }

    /// The memoized hash for `path`, if a record exists and is current
    pub fn lookup(&self, path: &Path) -> Option<ContentHash> {
        let source_mtime = fileops::mtime(path)?;
        let (record, hash) = self.records(&self.record_dir(path)).into_iter().next()?;

        if fileops::mtime(&record) != Some(source_mtime) {
            debug!("Precomputed hash out of date for {}", path.display());
            return None;
        }
        Some(hash)
    }

    /// Return the memoized hash for `path`, computing and recording it when
    /// missing or stale
    pub fn get_or_compute(
        &self,
        path: &Path,
        retry: &RetryPolicy,
        compute: impl FnOnce() -> MinBuildResult<ContentHash>,
    ) -> MinBuildResult<ContentHash> {
        if let Some(hash) = self.lookup(path) {
            return Ok(hash);
        }

        let hash = compute()?;
        self.record(path, hash, retry);
        Ok(hash)
    }

    fn record(&self, path: &Path, hash: ContentHash, retry: &RetryPolicy) {
        let Some(source_mtime) = fileops::mtime(path) else {
            return;
        };
        let dir = self.record_dir(path);
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Cannot create precomputed hash dir {}: {}", dir.display(), e);
            return;
        }

        for (stale, _) in self.records(&dir) {
            // Another writer may have removed it already
            let _ = fs::remove_file(stale);
        }

        let record = dir.join(format!("{hash}.{RECORD_EXT}"));
        if let Err(e) = fs::File::create(&record) {
            warn!("Cannot create precomputed hash {}: {}", record.display(), e);
            return;
        }
        if let Err(e) = fileops::touch_with_retry(retry, &record, source_mtime) {
            warn!("Cannot set modification time on {}: {}", record.display(), e);
        }
    }

    fn records(&self, dir: &Path) -> Vec<(PathBuf, ContentHash)> {
        let Ok(entries) = fs::read_dir(dir) else {
            return vec![];
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == RECORD_EXT))
            .filter_map(|p| {
                let hash = p.file_stem()?.to_str()?.parse().ok()?;
                Some((p, hash))
            })
            .collect()
    }
}
