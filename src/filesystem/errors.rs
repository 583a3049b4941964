//! Filesystem helper error types.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for filesystem helpers.
pub type FsResult<T> = Result<T, FilesystemError>;

/// Errors from directory creation, ownership changes, copies, and part
/// moves.
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path is not valid UTF-8 or contains NUL: {path}")]
    InvalidPath { path: PathBuf },

    /// The same part directory name was produced twice for one disk.
    #[error("duplicate part {part} while moving shadow into {path}")]
    DuplicatePart { part: String, path: PathBuf },
}

impl FilesystemError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        FilesystemError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_path(path: &Path) -> Self {
        FilesystemError::InvalidPath {
            path: path.to_path_buf(),
        }
    }
}
