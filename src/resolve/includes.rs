//! `#include` closure of a set of C/C++ sources

use crate::fileset::{native_path, normalize_key, starts_with_any};
use crate::text::decode_text;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*#\s*include\s*(?:"([^"]+)"|<([^>]+)>)"#).expect("include pattern is valid")
});

static MACRO_INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*include\s+[A-Za-z_]").expect("macro include pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Include {
    Quoted(String),
    Angle(String),
}

/// Walks the header graph depth first with an explicit stack.
///
/// Visited files are tracked by normalized path, so cycles terminate and a
/// header reached from several sources is reported once.
#[derive(Debug, Clone)]
pub struct IncludeWalker {
    search_dirs: Vec<PathBuf>,
    excluded_roots: Vec<String>,
}

impl IncludeWalker {
    pub fn new(search_dirs: Vec<PathBuf>, excluded_roots: Vec<String>) -> Self {
        Self {
            search_dirs,
            excluded_roots,
        }
    }

    /// Headers reachable from `sources`, in discovery order, excluding the
    /// sources themselves
    pub fn closure(&self, sources: &[PathBuf]) -> Vec<PathBuf> {
        let mut visited: HashSet<String> = sources.iter().map(|s| normalize_key(s)).collect();
        let mut stack: Vec<PathBuf> = sources.iter().rev().cloned().collect();
        let mut headers = Vec::new();

        while let Some(file) = stack.pop() {
            let includes = scan_includes(&file);
            let mut children = Vec::new();

            for include in includes {
                let Some(header) = self.resolve_include(&file, &include) else {
                    continue;
                };
                if starts_with_any(&normalize_key(&header), &self.excluded_roots) {
                    continue;
                }
                if visited.insert(normalize_key(&header)) {
                    debug!("{} includes {}", file.display(), header.display());
                    headers.push(header.clone());
                    children.push(header);
                }
            }

            // Reversed so the first include is walked first
            stack.extend(children.into_iter().rev());
        }
        headers
    }

    fn resolve_include(&self, includer: &Path, include: &Include) -> Option<PathBuf> {
        match include {
            Include::Quoted(name) => {
                let local = includer.parent().map(|dir| dir.join(native_path(name)));
                let found = local
                    .filter(|p| p.is_file())
                    .or_else(|| self.search(name));
                if found.is_none() {
                    warn!("Cannot resolve \"{}\" included from {}", name, includer.display());
                }
                found
            }
            Include::Angle(name) => self.search(name),
        }
    }

    fn search(&self, name: &str) -> Option<PathBuf> {
        let relative = native_path(name);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|p| p.is_file())
    }
}

fn scan_includes(file: &Path) -> Vec<Include> {
    let text = match fs::read(file) {
        Ok(bytes) => decode_text(&bytes).unwrap_or_default(),
        Err(e) => {
            warn!("Cannot read {}: {}", file.display(), e);
            return vec![];
        }
    };

    text.lines()
        .filter_map(|line| {
            if let Some(caps) = INCLUDE.captures(line) {
                return caps
                    .get(1)
                    .map(|m| Include::Quoted(m.as_str().to_string()))
                    .or_else(|| caps.get(2).map(|m| Include::Angle(m.as_str().to_string())));
            }
            if MACRO_INCLUDE.is_match(line) {
                warn!("Skipping macro include in {}: {}", file.display(), line.trim());
            }
            None
        })
        .collect()
}
