//! Error types for MinBuild
//!
//! All modules use `MinBuildResult<T>` as their return type. Whether an error
//! aborts the build step or only disables caching for it is decided by
//! [`MinBuildError::is_fatal`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for MinBuild operations
pub type MinBuildResult<T> = Result<T, MinBuildError>;

/// All errors that can occur in MinBuild
#[derive(Error, Debug)]
pub enum MinBuildError {
    // Resolution errors
    #[error("Dependency resolution failed: {reason}")]
    Resolution { reason: String },

    #[error("Declared input file is missing: {0}")]
    MissingInputFile(PathBuf),

    #[error("Dependency log {log} references a foreign build session: {line}")]
    StaleLogSession { log: PathBuf, line: String },

    #[error("Malformed line in dependency log {log}: {line:?}")]
    MalformedLogLine { log: PathBuf, line: String },

    // Cache errors
    #[error("Output set cannot be cached: {reason}")]
    UncacheableOutputSet { reason: String },

    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidCacheKey { key: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("File is locked by another process: {0}")]
    IoBlocked(PathBuf),

    #[error("Gave up {operation} {path} after {attempts} attempts")]
    RetriesExhausted {
        operation: String,
        path: PathBuf,
        attempts: u32,
        #[source]
        source: Box<MinBuildError>,
    },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl MinBuildError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a resolution error
    pub fn resolution(reason: impl Into<String>) -> Self {
        Self::Resolution {
            reason: reason.into(),
        }
    }

    /// Create an uncacheable output set error
    pub fn uncacheable(reason: impl Into<String>) -> Self {
        Self::UncacheableOutputSet {
            reason: reason.into(),
        }
    }

    /// Classify a raw IO error on `path`, mapping lock and sharing
    /// violations to [`MinBuildError::IoBlocked`].
    pub fn from_io(path: impl Into<PathBuf>, context: impl Into<String>, source: std::io::Error) -> Self {
        if is_lock_violation(&source) {
            Self::IoBlocked(path.into())
        } else {
            Self::io(context, source)
        }
    }

    /// Whether this error must abort the build step.
    ///
    /// Non-fatal errors only disable caching for the current invocation;
    /// the step then builds normally.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UncacheableOutputSet { .. }
                | Self::StaleLogSession { .. }
                | Self::MalformedLogLine { .. }
        )
    }

    /// Check if the operation that produced this error may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::IoBlocked(_) => true,
            Self::Io { source, .. } => is_transient_io(source),
            _ => false,
        }
    }

    /// Whether another process holds a lock on the file. Only these
    /// failures get the full retry budget.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Self::IoBlocked(_) => true,
            Self::Io { source, .. } => is_lock_violation(source),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingInputFile(_) => {
                Some("Set cache.create_missing_inputs = true to restore placeholder creation")
            }
            Self::RetriesExhausted { .. } => {
                Some("Check that the file is readable and not held by another process; see the [retry] settings")
            }
            Self::InvalidCacheKey { .. } => Some("Pass the key printed by `minbuild check`"),
            Self::ConfigInvalid { .. } => Some("Run: minbuild config show"),
            _ => None,
        }
    }
}

#[cfg(windows)]
fn is_lock_violation(err: &std::io::Error) -> bool {
    const ERROR_SHARING_VIOLATION: i32 = 0x20;
    const ERROR_LOCK_VIOLATION: i32 = 0x21;
    matches!(
        err.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_lock_violation(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
}

fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    is_lock_violation(err)
        || matches!(
            err.kind(),
            ErrorKind::PermissionDenied
                | ErrorKind::WouldBlock
                | ErrorKind::Interrupted
                | ErrorKind::TimedOut
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn error_display() {
        let err = MinBuildError::resolution("no inputs found");
        assert!(err.to_string().contains("no inputs found"));
    }

    #[test]
    fn non_fatal_errors_disable_caching_only() {
        assert!(!MinBuildError::uncacheable("duplicate basenames").is_fatal());
        assert!(!MinBuildError::StaleLogSession {
            log: PathBuf::from("link.read.1.tlog"),
            line: "C:\\BUILDAGENT\\X.CPP".to_string(),
        }
        .is_fatal());
        assert!(MinBuildError::resolution("nothing").is_fatal());
        assert!(MinBuildError::MissingInputFile(PathBuf::from("a.cpp")).is_fatal());
    }

    #[test]
    fn transient_classification() {
        let denied = MinBuildError::io("copy", io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(denied.is_transient());

        let missing = MinBuildError::io("copy", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!missing.is_transient());

        assert!(MinBuildError::IoBlocked(PathBuf::from("a.obj")).is_transient());
        assert!(MinBuildError::IoBlocked(PathBuf::from("a.obj")).is_lock_contention());
        assert!(!denied.is_lock_contention());
    }

    #[test]
    fn error_hint() {
        let err = MinBuildError::MissingInputFile(PathBuf::from("a.cpp"));
        assert!(err.hint().unwrap().contains("create_missing_inputs"));
        assert_eq!(MinBuildError::resolution("x").hint(), None);
    }
}
