//! Retry-tolerant file operations shared by the hasher and the store

use crate::error::{MinBuildError, MinBuildResult};
use crate::fileset::FileSet;
use crate::retry::RetryPolicy;
use filetime::FileTime;
use std::fs;
use std::path::Path;
use tracing::{debug, error};

/// Read a whole file, retrying while another process holds a lock on it
pub fn read_with_retry(policy: &RetryPolicy, path: &Path) -> MinBuildResult<Vec<u8>> {
    policy.run("reading", path, || {
        fs::read(path).map_err(|e| {
            MinBuildError::from_io(path, format!("reading {}", path.display()), e)
        })
    })
}

/// Copy `src` over `dst`, replacing any existing file
pub fn copy_with_retry(policy: &RetryPolicy, src: &Path, dst: &Path) -> MinBuildResult<()> {
    policy.run("copying to", dst, || {
        if dst.exists() {
            debug!("Deleting existing file {}", dst.display());
            fs::remove_file(dst).map_err(|e| {
                MinBuildError::from_io(dst, format!("deleting {}", dst.display()), e)
            })?;
        }
        fs::copy(src, dst).map(|_| ()).map_err(|e| {
            MinBuildError::from_io(
                dst,
                format!("copying {} to {}", src.display(), dst.display()),
                e,
            )
        })
    })
}

/// Set the modification time of a file or directory
pub fn touch_with_retry(policy: &RetryPolicy, path: &Path, time: FileTime) -> MinBuildResult<()> {
    policy.run("touching", path, || {
        filetime::set_file_mtime(path, time).map_err(|e| {
            MinBuildError::from_io(path, format!("touching {}", path.display()), e)
        })
    })
}

/// Modification time of `path`, or `None` if it cannot be read
pub fn mtime(path: &Path) -> Option<FileTime> {
    fs::metadata(path)
        .ok()
        .map(|meta| FileTime::from_last_modification_time(&meta))
}

/// Fail on the first missing input, or create an empty placeholder for it
/// when `create_missing` is set
pub fn ensure_inputs(inputs: &FileSet, create_missing: bool) -> MinBuildResult<()> {
    for input in inputs.iter().filter(|p| !p.is_file()) {
        if !create_missing {
            return Err(MinBuildError::MissingInputFile(input.to_path_buf()));
        }
        error!("Missing input {}, creating empty placeholder", input.display());
        if let Some(parent) = input.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| MinBuildError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::File::create(input)
            .map_err(|e| MinBuildError::io(format!("creating {}", input.display()), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copy_replaces_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.lib");
        let dst = dir.path().join("dst.lib");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        copy_with_retry(&RetryPolicy::immediate(1), &src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn read_missing_file_fails_without_retrying() {
        let dir = TempDir::new().unwrap();
        let err = read_with_retry(&RetryPolicy::immediate(5), &dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, MinBuildError::Io { .. }));
    }

    #[test]
    fn touch_sets_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.obj");
        fs::write(&path, b"x").unwrap();

        let when = FileTime::from_unix_time(1_000_000, 0);
        touch_with_retry(&RetryPolicy::immediate(1), &path, when).unwrap();
        assert_eq!(mtime(&path), Some(when));
    }

    #[test]
    fn missing_input_is_fatal_unless_placeholders_allowed() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gen").join("version.h");
        let inputs = FileSet::canonical(vec![missing.clone()]);

        let err = ensure_inputs(&inputs, false).unwrap_err();
        assert!(matches!(err, MinBuildError::MissingInputFile(_)));
        assert!(err.is_fatal());

        ensure_inputs(&inputs, true).unwrap();
        assert_eq!(fs::read(&missing).unwrap(), b"");
    }
}
