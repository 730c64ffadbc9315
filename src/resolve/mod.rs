//! Dependency resolution: the true inputs and outputs of a build step
//!
//! Cache correctness depends entirely on enumerating a step's inputs and
//! outputs before hashing them. Omitting a real input reuses a stale binary;
//! including noisy or machine-local paths makes every run a miss. Each
//! toolchain gets its own [`DependencyResolver`]:
//!
//! | Resolver | Source of truth |
//! |----------|-----------------|
//! | [`ListResolver`] | Explicit `;`-delimited input and output lists |
//! | [`MakefileResolver`] | Legacy Makefile variable blocks plus the `#include` closure |
//! | [`CompileLogResolver`] | Read/write dependency-tracking logs of a compile+link toolchain |

pub mod compile_log;
pub mod includes;
pub mod list;
pub mod makefile;

pub use compile_log::{CompileLogResolver, TrackingLogStash};
pub use includes::IncludeWalker;
pub use list::ListResolver;
pub use makefile::MakefileResolver;

use crate::error::{MinBuildError, MinBuildResult};
use crate::fileset::FileSet;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Which family of build step an entry belongs to; each kind has its own
/// subtree under the cache root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// Managed-language projects with explicit file lists
    List,
    /// Legacy Makefile-driven toolchain
    Makefile,
    /// Two-phase compile+link toolchain with dependency-tracking logs
    CompileLog,
}

impl CacheKind {
    /// Directory name under the cache root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Makefile => "makefile",
            Self::CompileLog => "compile-log",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Normalized inputs and outputs of one build step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub inputs: FileSet,
    pub outputs: FileSet,
}

impl Resolution {
    /// Fails with [`MinBuildError::Resolution`] when either side is empty
    pub fn new(inputs: FileSet, outputs: FileSet) -> MinBuildResult<Self> {
        if inputs.is_empty() {
            return Err(MinBuildError::resolution("no input files found"));
        }
        if outputs.is_empty() {
            return Err(MinBuildError::resolution("no declared output target found"));
        }
        Ok(Self { inputs, outputs })
    }
}

/// Produces the `(inputs, outputs)` pair a cache key is computed from
pub trait DependencyResolver {
    /// Cache subtree this resolver's entries live in
    fn kind(&self) -> CacheKind;

    /// Resolve the step's inputs and outputs
    fn resolve(&self) -> MinBuildResult<Resolution>;

    /// Workspace root that source-map paths are made relative to
    fn root_dir(&self) -> Option<&Path> {
        None
    }
}

impl<R: DependencyResolver + ?Sized> DependencyResolver for Box<R> {
    fn kind(&self) -> CacheKind {
        (**self).kind()
    }

    fn resolve(&self) -> MinBuildResult<Resolution> {
        (**self).resolve()
    }

    fn root_dir(&self) -> Option<&Path> {
        (**self).root_dir()
    }
}
