//! Deterministic content hashing of build inputs
//!
//! A cache key is the SHA-256 of the concatenated per-file content hashes of
//! an input set, in the set's canonical order, rehashed together with the
//! build configuration. Each file is hashed independently (in parallel), so
//! the whole input set never sits in memory at once.
//!
//! Files under an immutable toolchain root go through the on-disk
//! [`PrecomputedHashes`] memo instead of being read every time.

pub mod precomputed;

pub use precomputed::PrecomputedHashes;

use crate::config::schema::HashConfig;
use crate::error::{MinBuildError, MinBuildResult};
use crate::fileops;
use crate::fileset::{ends_with_any, normalize_key, starts_with_any, FileSet};
use crate::retry::RetryPolicy;
use crate::text::decode_text;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// SHA-256 digest of some content, serialized as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash a byte slice
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl FromStr for ContentHash {
    type Err = MinBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| MinBuildError::InvalidCacheKey {
            key: s.to_string(),
            reason,
        };
        let bytes = hex::decode(s.trim()).map_err(|e| invalid(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| invalid(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(bytes))
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = MinBuildError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Identifies one (input content set, build configuration) pair
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(ContentHash);

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.0)
    }
}

impl FromStr for CacheKey {
    type Err = MinBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Content hasher for input files and input sets
pub struct HashEngine {
    config: HashConfig,
    retry: RetryPolicy,
    precomputed: Option<PrecomputedHashes>,
    show_hashes: bool,
    files_hashed: AtomicUsize,
}

impl HashEngine {
    pub fn new(config: HashConfig, retry: RetryPolicy) -> Self {
        Self {
            config,
            retry,
            precomputed: None,
            show_hashes: false,
            files_hashed: AtomicUsize::new(0),
        }
    }

    /// Memoize hashes of immutable files in `store`
    pub fn with_precomputed(mut self, store: PrecomputedHashes) -> Self {
        self.precomputed = Some(store);
        self
    }

    /// Log per-file hashes at info instead of debug level
    pub fn show_hashes(mut self, show: bool) -> Self {
        self.show_hashes = show;
        self
    }

    /// Number of `hash_file` calls made so far
    pub fn files_hashed(&self) -> usize {
        self.files_hashed.load(Ordering::Relaxed)
    }

    /// Whether `path` lives under a root that is assumed never to change
    pub fn is_immutable(&self, path: &Path) -> bool {
        starts_with_any(&normalize_key(path), &self.config.immutable_roots)
    }

    /// Hash one file's content.
    ///
    /// Version-stamp files have their version lines removed first, so a
    /// version bump alone never invalidates the cache.
    pub fn hash_file(&self, path: &Path) -> MinBuildResult<ContentHash> {
        self.files_hashed.fetch_add(1, Ordering::Relaxed);

        if let Some(precomputed) = self.precomputed.as_ref().filter(|_| self.is_immutable(path)) {
            return precomputed.get_or_compute(path, &self.retry, || self.hash_content(path));
        }
        self.hash_content(path)
    }

    fn hash_content(&self, path: &Path) -> MinBuildResult<ContentHash> {
        let bytes = fileops::read_with_retry(&self.retry, path)?;

        if ends_with_any(&normalize_key(path), &self.config.version_stamp_files) {
            if let Some(text) = decode_text(&bytes) {
                let stripped = self.strip_version_lines(&text);
                return Ok(ContentHash::of(stripped.as_bytes()));
            }
            debug!("{} is not text, hashing raw bytes", path.display());
        }
        Ok(ContentHash::of(&bytes))
    }

    fn strip_version_lines(&self, text: &str) -> String {
        text.lines()
            .filter(|line| {
                !self
                    .config
                    .version_keywords
                    .iter()
                    .any(|kw| line.contains(kw.as_str()))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Hash a whole input set.
    ///
    /// Per-file hashes are concatenated in the set's canonical order, so the
    /// result does not depend on how the caller enumerated the files.
    pub fn hash_files(&self, files: &FileSet) -> MinBuildResult<ContentHash> {
        let hashes = files
            .as_slice()
            .par_iter()
            .map(|path| self.hash_file(path).map(|hash| (path, hash)))
            .collect::<MinBuildResult<Vec<_>>>()?;

        let mut concatenated = String::with_capacity(hashes.len() * 64);
        for (path, hash) in &hashes {
            if self.show_hashes {
                info!("\tInput: {} {}", path.display(), hash);
            } else {
                debug!("\tInput: {} {}", path.display(), hash);
            }
            concatenated.push_str(&hash.to_string());
        }

        let combined = ContentHash::of(concatenated.as_bytes());
        debug!("Generated hash for {} files: {}", hashes.len(), combined);
        Ok(combined)
    }

    /// Rehash with the build configuration so identical inputs built under
    /// different configurations never share a key
    pub fn combine_with_config(hash: ContentHash, build_config: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(hash.to_string().as_bytes());
        hasher.update(build_config.as_bytes());
        CacheKey(ContentHash(hasher.finalize().into()))
    }

    /// Cache key for an input set under `build_config`
    pub fn cache_key(&self, inputs: &FileSet, build_config: &str) -> MinBuildResult<CacheKey> {
        let hash = self.hash_files(inputs)?;
        Ok(Self::combine_with_config(hash, build_config))
    }
}
