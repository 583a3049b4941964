//! Metadata writer error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::filesystem::FilesystemError;

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors from serializing or writing backup metadata artifacts.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("can't marshal metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("can't write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl MetadataError {
    pub fn io(path: &std::path::Path, source: io::Error) -> Self {
        MetadataError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
