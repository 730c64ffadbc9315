//! Explicit path-list resolution for managed-language projects

use super::{CacheKind, DependencyResolver, Resolution};
use crate::config::schema::ResolveConfig;
use crate::error::MinBuildResult;
use crate::fileset::{ends_with_any, native_path, normalize_str, starts_with_any, FileSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Separator between entries of a raw file list
pub const LIST_DELIMITER: char = ';';

/// Resolves a step from the `;`-delimited lists its project declares
#[derive(Debug, Clone)]
pub struct ListResolver {
    raw_inputs: String,
    raw_outputs: String,
    root_dir: Option<PathBuf>,
    config: ResolveConfig,
}

impl ListResolver {
    pub fn new(raw_inputs: impl Into<String>, raw_outputs: impl Into<String>, config: ResolveConfig) -> Self {
        Self {
            raw_inputs: raw_inputs.into(),
            raw_outputs: raw_outputs.into(),
            root_dir: None,
            config,
        }
    }

    /// Workspace root recorded in the source map on commit
    pub fn with_root_dir(mut self, root: Option<PathBuf>) -> Self {
        self.root_dir = root;
        self
    }
}

impl DependencyResolver for ListResolver {
    fn kind(&self) -> CacheKind {
        CacheKind::List
    }

    fn resolve(&self) -> MinBuildResult<Resolution> {
        let inputs = parse_file_list(&self.raw_inputs, &self.config);
        let outputs = parse_file_list(&self.raw_outputs, &self.config);
        Resolution::new(inputs, outputs)
    }

    fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }
}

/// Parse a raw file list into a canonical set.
///
/// Entries under system roots or with a noise suffix are dropped. The
/// temporary project file gets a random name on every build, so the first
/// one is kept out of the sort and appended last; its content still counts.
/// Any further temporary projects sort with the rest.
pub fn parse_file_list(raw: &str, config: &ResolveConfig) -> FileSet {
    let temp_suffix = normalize_str(&config.temp_project_suffix);
    let mut temp_project: Option<(String, PathBuf)> = None;
    let mut kept = Vec::new();

    for entry in raw.split(LIST_DELIMITER).map(str::trim).filter(|e| !e.is_empty()) {
        let key = normalize_str(entry);
        if starts_with_any(&key, &config.system_roots) || ends_with_any(&key, &config.noise_suffixes) {
            debug!("Ignoring environment file {}", entry);
            continue;
        }
        if !temp_suffix.is_empty() && key.ends_with(&temp_suffix) {
            match &temp_project {
                None => {
                    debug!("Moving temporary project to end of list: {}", entry);
                    temp_project = Some((key, native_path(entry)));
                    continue;
                }
                Some((first, _)) if *first == key => continue,
                Some(_) => {}
            }
        }
        kept.push(native_path(entry));
    }

    let mut files = FileSet::canonical(kept);
    if let Some((_, project)) = temp_project {
        files.push(project);
    }
    files
}

/// Split a raw list without filtering, for declared inputs that only locate
/// a log stash
pub fn split_file_list(raw: &str) -> Vec<PathBuf> {
    raw.split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(native_path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MinBuildError;

    fn names(files: &FileSet) -> Vec<String> {
        files.iter().map(|p| p.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn trims_dedups_and_sorts() {
        let files = parse_file_list(" /src/b.cs ; /src/a.cs;;/SRC/B.cs ", &ResolveConfig::default());
        assert_eq!(names(&files), vec!["/src/a.cs", "/src/b.cs"]);
    }

    #[test]
    fn drops_environment_and_noise_paths() {
        let raw = "c:/windows/microsoft.net/mscorlib.dll;\
                   C:/Program Files (x86)/Reference Assemblies/System.dll;\
                   /src/Properties/AssemblyInfo.cs;\
                   /src/obj/Debug/.NETFramework,Version=v4.8.AssemblyAttributes.cs;\
                   /src/app.rc;\
                   /src/main.cs";
        let files = parse_file_list(raw, &ResolveConfig::default());
        assert_eq!(names(&files), vec!["/src/main.cs"]);
    }

    #[test]
    fn temp_project_is_kept_last() {
        let raw = "/src/z.cs;/obj/abc123.tmp_proj;/src/a.cs";
        let files = parse_file_list(raw, &ResolveConfig::default());
        assert_eq!(names(&files), vec!["/src/a.cs", "/src/z.cs", "/obj/abc123.tmp_proj"]);
    }

    #[test]
    fn only_first_temp_project_is_moved() {
        let raw = "/obj/zz9.tmp_proj;/src/b.cs;/obj/aa1.tmp_proj;/OBJ/ZZ9.tmp_proj;/src/a.cs";
        let files = parse_file_list(raw, &ResolveConfig::default());
        assert_eq!(
            names(&files),
            vec!["/obj/aa1.tmp_proj", "/src/a.cs", "/src/b.cs", "/obj/zz9.tmp_proj"]
        );
    }

    #[test]
    fn resolve_requires_outputs() {
        let resolver = ListResolver::new("/src/a.cs", "", ResolveConfig::default());
        assert!(matches!(resolver.resolve(), Err(MinBuildError::Resolution { .. })));
    }

    #[test]
    fn resolve_both_sides() {
        let resolver = ListResolver::new("/src/b.cs;/src/a.cs", "/bin/app.dll;/bin/app.pdb", ResolveConfig::default());
        let resolution = resolver.resolve().unwrap();
        assert_eq!(resolution.inputs.len(), 2);
        assert_eq!(names(&resolution.outputs), vec!["/bin/app.dll", "/bin/app.pdb"]);
    }

    #[test]
    fn split_keeps_everything() {
        assert_eq!(split_file_list("a.cpp; c:/windows/x.h ;"), vec![
            PathBuf::from("a.cpp"),
            native_path("c:/windows/x.h"),
        ]);
    }
}
