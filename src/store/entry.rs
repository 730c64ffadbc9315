//! Read-only view of a cache entry, for `minbuild inspect`

use super::{BRANCH_FILE, COMPLETE_MARKER, SOURCE_MAP_EXT};
use crate::error::{MinBuildError, MinBuildResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryFile {
    pub name: String,
    pub size_bytes: u64,
}

/// Summary of one entry directory
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path: PathBuf,
    pub complete: bool,
    pub branch: Option<String>,
    /// Entry directory mtime, refreshed on every restore
    pub last_used: Option<DateTime<Utc>>,
    pub files: Vec<EntryFile>,
    pub source_maps: usize,
}

impl EntryInfo {
    pub fn load(path: &Path) -> MinBuildResult<Self> {
        let listing = fs::read_dir(path)
            .map_err(|e| MinBuildError::io(format!("reading entry {}", path.display()), e))?;

        let mut files = Vec::new();
        let mut source_maps = 0;
        for item in listing.filter_map(Result::ok) {
            let name = item.file_name().to_string_lossy().into_owned();
            if name == COMPLETE_MARKER || name == BRANCH_FILE {
                continue;
            }
            if Path::new(&name).extension().is_some_and(|ext| ext == SOURCE_MAP_EXT) {
                source_maps += 1;
                continue;
            }
            let size_bytes = item.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(EntryFile { name, size_bytes });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let last_used = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(Self {
            path: path.to_path_buf(),
            complete: path.join(COMPLETE_MARKER).is_file(),
            branch: fs::read_to_string(path.join(BRANCH_FILE))
                .ok()
                .map(|b| b.trim().to_string()),
            last_used,
            files,
            source_maps,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    /// Whole days since the entry was last restored or committed
    pub fn age_days(&self) -> Option<i64> {
        self.last_used.map(|t| (Utc::now() - t).num_days())
    }
}
