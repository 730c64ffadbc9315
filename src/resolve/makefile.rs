//! Legacy Makefile resolution
//!
//! Reads the variable blocks a Makefile declares its sources, libraries,
//! resource dependencies, linker flags, include path and target in, then
//! adds the `#include` closure of the sources.

use super::includes::IncludeWalker;
use super::{CacheKind, DependencyResolver, Resolution};
use crate::config::schema::ResolveConfig;
use crate::error::{MinBuildError, MinBuildResult};
use crate::fileset::{native_path, FileSet};
use crate::text::decode_text;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=(.*)$").expect("assignment pattern is valid")
});

const CONTINUATION: &str = "\\";
const MACRO_SIGIL: char = '$';

const SOURCE_KEY: &str = "SOURCE";
const LIBRARY_KEY: &str = "LIBFILES";
const RESOURCE_KEY: &str = "RESDEPEN";
const LINKER_FLAGS_KEY: &str = "LFLAGS";
const INCLUDE_PATH_KEY: &str = "INCLUDEPATH";
const TARGET_KEY: &str = "TARGET";

const IMPORT_LIBRARY_FLAG: &str = "-Gi";
const PACKAGE_LIBRARY_FLAG: &str = "-Gl";

/// Variable blocks of one Makefile, tokens in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakefileBlocks {
    pub sources: Vec<String>,
    pub libraries: Vec<String>,
    pub resources: Vec<String>,
    pub linker_flags: Vec<String>,
    pub include_path: Vec<String>,
    pub target: Option<String>,
}

impl MakefileBlocks {
    pub fn parse(content: &str) -> Self {
        let lines: Vec<&str> = content.lines().collect();
        // One token can hold several directories, only some of them macros
        let include_path = block_tokens(&lines, INCLUDE_PATH_KEY)
            .iter()
            .flat_map(|token| token.split(';'))
            .filter(|dir| !dir.is_empty() && !dir.contains(MACRO_SIGIL))
            .map(str::to_string)
            .collect();

        Self {
            sources: parse_block(&lines, SOURCE_KEY),
            libraries: parse_block(&lines, LIBRARY_KEY),
            resources: parse_block(&lines, RESOURCE_KEY),
            linker_flags: parse_block(&lines, LINKER_FLAGS_KEY),
            include_path,
            target: parse_block(&lines, TARGET_KEY).into_iter().next(),
        }
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.linker_flags.iter().any(|f| f == flag)
    }
}

/// Tokens of the block assigned to `key`.
///
/// The block runs from the `KEY=` line until the next assignment. Blank and
/// comment lines are skipped; continuation markers and macro references are
/// discarded.
pub fn parse_block(lines: &[&str], key: &str) -> Vec<String> {
    block_tokens(lines, key)
        .into_iter()
        .filter(|t| !t.contains(MACRO_SIGIL))
        .collect()
}

/// Like [`parse_block`], keeping macro references
fn block_tokens(lines: &[&str], key: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut in_block = false;

    for line in lines {
        let body = match ASSIGNMENT.captures(line) {
            Some(caps) if !in_block && &caps[1] == key => {
                in_block = true;
                caps.get(2).map_or("", |m| m.as_str()).to_string()
            }
            Some(_) if in_block => break,
            _ if in_block => line.to_string(),
            _ => continue,
        };

        let body = body.replace('\t', " ");
        if body.trim_start().starts_with('#') {
            continue;
        }
        tokens.extend(split_tokens(&body).into_iter().filter(|t| t != CONTINUATION));
    }
    tokens
}

/// Whitespace-separated tokens; double quotes group a token with spaces
fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Resolves a Makefile-driven step
#[derive(Debug, Clone)]
pub struct MakefileResolver {
    makefile: PathBuf,
    config: ResolveConfig,
}

impl MakefileResolver {
    pub fn new(makefile: impl Into<PathBuf>, config: ResolveConfig) -> Self {
        Self {
            makefile: makefile.into(),
            config,
        }
    }

    fn base_dir(&self) -> &Path {
        self.makefile.parent().unwrap_or_else(|| Path::new(""))
    }

    fn locate(&self, token: &str) -> PathBuf {
        self.base_dir().join(native_path(token))
    }

    /// Existing files among `tokens`; missing ones are logged and dropped
    fn existing(&self, tokens: &[String], what: &str) -> Vec<PathBuf> {
        tokens
            .iter()
            .map(|t| self.locate(t))
            .filter(|path| {
                let exists = path.is_file();
                if !exists {
                    debug!("Ignoring missing {} {}", what, path.display());
                }
                exists
            })
            .collect()
    }

    fn outputs(&self, blocks: &MakefileBlocks) -> MinBuildResult<FileSet> {
        let target = blocks.target.as_deref().ok_or_else(|| {
            MinBuildError::resolution(format!("target not found in {}", self.makefile.display()))
        })?;
        let target = self.locate(target);
        let extension = target
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut outputs = vec![target.clone()];
        match extension.as_str() {
            "dll" if blocks.has_flag(IMPORT_LIBRARY_FLAG) => {
                outputs.push(target.with_extension("lib"));
            }
            "bpl" => {
                if blocks.has_flag(IMPORT_LIBRARY_FLAG) {
                    outputs.push(target.with_extension("bpi"));
                }
                if blocks.has_flag(PACKAGE_LIBRARY_FLAG) {
                    outputs.push(target.with_extension("lib"));
                }
            }
            _ => {}
        }
        Ok(FileSet::ordered(outputs))
    }
}

impl DependencyResolver for MakefileResolver {
    fn kind(&self) -> CacheKind {
        CacheKind::Makefile
    }

    fn resolve(&self) -> MinBuildResult<Resolution> {
        if !self.makefile.is_file() {
            return Err(MinBuildError::resolution(format!(
                "{} not found",
                self.makefile.display()
            )));
        }

        info!("Reading inputs from {}", self.makefile.display());
        let bytes = fs::read(&self.makefile)
            .map_err(|e| MinBuildError::io(format!("reading {}", self.makefile.display()), e))?;
        let content = decode_text(&bytes).ok_or_else(|| {
            MinBuildError::resolution(format!("{} is not a text file", self.makefile.display()))
        })?;
        let blocks = MakefileBlocks::parse(&content);

        let sources = self.existing(&blocks.sources, "source");
        if sources.is_empty() {
            return Err(MinBuildError::resolution(format!(
                "no sources found in {}",
                self.makefile.display()
            )));
        }

        let search_dirs = blocks
            .include_path
            .iter()
            .map(|dir| self.locate(dir))
            .chain(self.config.include_paths.iter().cloned())
            .collect();
        let walker = IncludeWalker::new(search_dirs, self.config.system_roots.clone());
        let headers = walker.closure(&sources);

        let mut inputs = sources;
        inputs.extend(headers);
        inputs.extend(self.existing(&blocks.libraries, "library"));
        inputs.extend(self.existing(&blocks.resources, "resource dependency"));
        inputs.push(self.makefile.clone());

        Resolution::new(FileSet::canonical(inputs), self.outputs(&blocks)?)
    }
}
