//! Normalized, deduplicated file path sets
//!
//! Paths keep their on-disk spelling for IO, but ordering, deduplication and
//! prefix tests all go through [`normalize_key`] so that enumeration order
//! and path casing never change a cache key.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Case- and separator-insensitive comparison key for a path
pub fn normalize_key(path: &Path) -> String {
    normalize_str(&path.to_string_lossy())
}

/// Case- and separator-insensitive comparison key for a raw path string
pub fn normalize_str(raw: &str) -> String {
    raw.trim().replace('\\', "/").to_lowercase()
}

/// Whether `key` (already normalized) starts with any of `prefixes`
pub fn starts_with_any(key: &str, prefixes: &[String]) -> bool {
    prefixes
        .iter()
        .map(|p| normalize_str(p))
        .any(|p| !p.is_empty() && key.starts_with(&p))
}

/// Whether `key` (already normalized) ends with any of `suffixes`
pub fn ends_with_any(key: &str, suffixes: &[String]) -> bool {
    suffixes
        .iter()
        .map(|s| normalize_str(s))
        .any(|s| !s.is_empty() && key.ends_with(&s))
}

/// Path from a toolchain-written string, using the host separator
pub fn native_path(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if std::path::MAIN_SEPARATOR == '\\' {
        PathBuf::from(raw)
    } else {
        PathBuf::from(raw.replace('\\', "/"))
    }
}

/// Normalized final component of a path
pub fn basename_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Ordered set of file paths with no two entries sharing a normalized key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    paths: Vec<PathBuf>,
}

impl FileSet {
    /// Sorted by normalized key; the first spelling of a duplicate wins
    pub fn canonical(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut keyed: Vec<(String, PathBuf)> =
            paths.into_iter().map(|p| (normalize_key(&p), p)).collect();
        // Stable sort keeps the first spelling ahead of later duplicates
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|later, earlier| later.0 == earlier.0);
        Self {
            paths: keyed.into_iter().map(|(_, p)| p).collect(),
        }
    }

    /// Declaration order preserved; later duplicates dropped
    pub fn ordered(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut seen = HashSet::new();
        let paths = paths
            .into_iter()
            .filter(|p| seen.insert(normalize_key(p)))
            .collect();
        Self { paths }
    }

    /// Append `path` after the existing entries unless already present
    pub fn push(&mut self, path: PathBuf) {
        let key = normalize_key(&path);
        if !self.paths.iter().any(|p| normalize_key(p) == key) {
            self.paths.push(path);
        }
    }

    /// The first entry, used as the primary output
    pub fn primary(&self) -> Option<&Path> {
        self.paths.first().map(PathBuf::as_path)
    }

    /// Entries whose basename collides with an earlier entry
    pub fn duplicate_basenames(&self) -> Vec<&Path> {
        let mut seen = HashSet::new();
        self.paths
            .iter()
            .filter(|p| !seen.insert(basename_key(p)))
            .map(PathBuf::as_path)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_vec(self) -> Vec<PathBuf> {
        self.paths
    }
}

impl FromIterator<PathBuf> for FileSet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self::canonical(iter)
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn normalize_ignores_case_and_separators() {
        assert_eq!(normalize_str("  C:\\Src\\A.CPP "), "c:/src/a.cpp");
        assert_eq!(normalize_key(Path::new("/Src/a.cpp")), "/src/a.cpp");
    }

    #[cfg(not(windows))]
    #[test]
    fn native_path_converts_separators() {
        assert_eq!(native_path(" src\\common\\a.h "), PathBuf::from("src/common/a.h"));
    }

    #[test]
    fn canonical_sorts_and_dedups_case_insensitively() {
        let files = FileSet::canonical(set(&["/src/b.h", "/src/A.cpp", "/SRC/a.CPP"]));
        assert_eq!(files.as_slice(), &set(&["/src/A.cpp", "/src/b.h"])[..]);
    }

    #[test]
    fn canonical_is_order_independent() {
        let a = FileSet::canonical(set(&["/x/c", "/x/a", "/x/b"]));
        let b = FileSet::canonical(set(&["/x/b", "/x/c", "/x/a"]));
        assert_eq!(a, b);
    }

    #[test]
    fn ordered_keeps_declaration_order() {
        let files = FileSet::ordered(set(&["/out/z.dll", "/out/a.lib", "/OUT/Z.DLL"]));
        assert_eq!(files.as_slice(), &set(&["/out/z.dll", "/out/a.lib"])[..]);
        assert_eq!(files.primary(), Some(Path::new("/out/z.dll")));
    }

    #[test]
    fn duplicate_basenames_detected() {
        let files = FileSet::canonical(set(&["/a/out.dll", "/b/OUT.dll", "/b/other.dll"]));
        assert_eq!(files.duplicate_basenames(), vec![Path::new("/b/OUT.dll")]);
    }

    #[test]
    fn prefix_and_suffix_matching() {
        let roots = vec!["C:\\Windows".to_string()];
        assert!(starts_with_any("c:/windows/system32/x.h", &roots));
        assert!(!starts_with_any("c:/src/x.h", &roots));
        assert!(ends_with_any("c:/src/assemblyinfo.cs", &["AssemblyInfo.cs".to_string()]));
    }
}
