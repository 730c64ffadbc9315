//! Timestamp fast path
//!
//! A step is up to date when every output exists and every input is strictly
//! older than the oldest output. This only ever saves hashing; a stale answer
//! falls through to the content-hash check.

use crate::fileops;
use crate::fileset::FileSet;
use filetime::FileTime;
use std::fmt;
use std::path::PathBuf;

/// Result of a timestamp comparison, carrying the recompile reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    UpToDate,
    /// Outputs that do not exist
    MissingOutputs(Vec<PathBuf>),
    /// An input that is missing or not older than the oldest output
    InputChanged(PathBuf),
}

impl Staleness {
    /// Compare input and output timestamps
    pub fn check(inputs: &FileSet, outputs: &FileSet) -> Self {
        let mut missing = Vec::new();
        let mut oldest: Option<FileTime> = None;

        for output in outputs {
            match fileops::mtime(output) {
                Some(time) => oldest = Some(oldest.map_or(time, |o| o.min(time))),
                None => missing.push(output.clone()),
            }
        }
        if !missing.is_empty() {
            return Self::MissingOutputs(missing);
        }
        let Some(oldest) = oldest else {
            return Self::MissingOutputs(vec![]);
        };

        inputs
            .iter()
            .find(|input| fileops::mtime(input).is_none_or(|time| time >= oldest))
            .map_or(Self::UpToDate, |input| Self::InputChanged(input.to_path_buf()))
    }

    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => write!(f, "outputs are up to date"),
            Self::MissingOutputs(paths) if paths.is_empty() => write!(f, "no outputs declared"),
            Self::MissingOutputs(paths) => {
                let names: Vec<_> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "missing outputs: {}", names.join(", "))
            }
            Self::InputChanged(path) => write!(f, "{} is newer than the outputs", path.display()),
        }
    }
}
