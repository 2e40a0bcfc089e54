//! Filesystem helpers that report failures as [`CoreError`].

use crate::error::CoreError;
use std::fs;
use std::path::Path;

/// Ensures that a directory exists at `path`, creating missing parents.
///
/// Fails if the path exists but is not a directory.
pub fn ensure_dir_exists(path: &Path) -> Result<(), CoreError> {
    if path.exists() {
        if path.is_dir() {
            Ok(())
        } else {
            Err(CoreError::Filesystem {
                message: "Path exists but is not a directory".to_string(),
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "Path exists but is not a directory",
                ),
            })
        }
    } else {
        fs::create_dir_all(path).map_err(|e| CoreError::Filesystem {
            message: "Failed to create directory".to_string(),
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Checks that `path` names an existing directory without creating it.
///
/// Used for search paths handed to the compositor on the command line.
pub fn require_existing_dir(path: &Path) -> Result<(), CoreError> {
    if path.as_os_str().is_empty() {
        return Err(CoreError::InvalidInput("empty directory path".to_string()));
    }
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CoreError::Filesystem {
            message: "Path is not a directory".to_string(),
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        }),
        Err(e) => Err(CoreError::Filesystem {
            message: "Directory is not accessible".to_string(),
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
