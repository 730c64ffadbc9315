//! Audit map linking an entry's outputs to the inputs that produced them
//!
//! Purely informational: restores copy it beside the primary output for
//! external tracing tools, but it never affects a hit or a miss.

use crate::fileset::{normalize_key, normalize_str, FileSet};
use std::path::Path;
use uuid::Uuid;

/// Extension of source-map files inside an entry
pub const SOURCE_MAP_EXT: &str = "mapped";

/// Output extensions left out of the map
const UNMAPPED_OUTPUT_EXTS: &[&str] = &["pdb", "map", "cs"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMap {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl SourceMap {
    /// Inputs are recorded relative to `root` and lowercased; outputs by
    /// basename only
    pub fn new(inputs: &FileSet, outputs: &FileSet, root: &Path) -> Self {
        let mut prefix = normalize_key(root);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }

        let inputs = inputs
            .iter()
            .map(|path| {
                let key = normalize_key(path);
                key.strip_prefix(&prefix).map(str::to_string).unwrap_or(key)
            })
            .collect();

        let outputs = outputs
            .iter()
            .filter(|path| {
                let ext = path
                    .extension()
                    .map(|e| normalize_str(&e.to_string_lossy()))
                    .unwrap_or_default();
                !UNMAPPED_OUTPUT_EXTS.contains(&ext.as_str())
            })
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        Self { inputs, outputs }
    }

    /// Fresh file name, unique across concurrent committers
    pub fn file_name() -> String {
        format!("{}.{}", Uuid::new_v4(), SOURCE_MAP_EXT)
    }

    /// `INP:` lines followed by `OUT:` lines
    pub fn render(&self) -> String {
        let mut text = String::new();
        for input in &self.inputs {
            text.push_str("INP:");
            text.push_str(input);
            text.push('\n');
        }
        for output in &self.outputs {
            text.push_str("OUT:");
            text.push_str(output);
            text.push('\n');
        }
        text
    }
}
